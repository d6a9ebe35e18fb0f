use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Next wake-up time, shared between a timer handle (which pushes it out) and its task (which
/// consumes it). An empty deadline means "nobody pushed it out since the last wake-up".
#[derive(Clone, Default)]
pub(super) struct SharedDeadline {
    next: Arc<Mutex<Option<Instant>>>,
}

impl SharedDeadline {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn push_out(&self, deadline: Instant) {
        self.next
            .lock()
            .expect("SharedDeadline.push_out() mutex guard poison")
            .replace(deadline);
    }

    pub(super) fn take(&self) -> Option<Instant> {
        self.next.lock().expect("SharedDeadline.take() mutex guard poison").take()
    }
}

/// Flips the paired `StopCheck` when dropped.
pub(super) struct Stopper {
    stopped: Arc<AtomicBool>,
}

pub(super) struct StopCheck {
    stopped: Arc<AtomicBool>,
}

pub(super) fn stop_pair() -> (Stopper, StopCheck) {
    let stopped = Arc::new(AtomicBool::new(false));
    (
        Stopper {
            stopped: stopped.clone(),
        },
        StopCheck { stopped },
    )
}

impl Drop for Stopper {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl StopCheck {
    pub(super) fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn take_empties_the_deadline() {
        let deadline = SharedDeadline::new();
        assert_eq!(deadline.take(), None);

        let now = Instant::now();
        deadline.push_out(now);
        deadline.clone().push_out(now + Duration::from_secs(1));
        assert_eq!(deadline.take(), Some(now + Duration::from_secs(1)));
        assert_eq!(deadline.take(), None);
    }

    #[test]
    fn drop_stops() {
        let (stopper, check) = stop_pair();
        assert!(!check.should_stop());
        drop(stopper);
        assert!(check.should_stop());
    }
}
