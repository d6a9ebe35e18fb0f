use tokio::time::Instant;

#[cfg(test)]
use tokio::sync::watch;
#[cfg(test)]
use tokio::time::Duration;

/// Source of time for the election and heartbeat timers.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone {
    fn now(&self) -> Instant;
    async fn wait_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone)]
pub(crate) struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn wait_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Stands still until its `ClockHand` moves it forward.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: watch::Receiver<Instant>,
}

#[cfg(test)]
pub(crate) struct ClockHand {
    now: Instant,
    started_at: Instant,
    tx: watch::Sender<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn start() -> (ManualClock, ClockHand) {
        let started_at = Instant::now();
        let (tx, rx) = watch::channel(started_at);
        let hand = ClockHand {
            now: started_at,
            started_at,
            tx,
        };

        (ManualClock { now: rx }, hand)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    async fn wait_until(&mut self, deadline: Instant) {
        while *self.now.borrow() < deadline {
            if self.now.changed().await.is_err() {
                // Hand dropped; time will never reach the deadline.
                futures::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
impl ClockHand {
    /// Waiters see only the new time, so a single big step wakes a periodic waiter once.
    pub(crate) fn advance(&mut self, by: Duration) {
        self.now += by;
        let _ = self.tx.send(self.now);
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.now - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn waiter_wakes_once_deadline_is_reached() {
        let (mut clock, mut hand) = ManualClock::start();
        let deadline = clock.now() + Duration::from_secs(1);
        let (woke_tx, mut woke_rx) = oneshot::channel();
        tokio::spawn(async move {
            clock.wait_until(deadline).await;
            let _ = woke_tx.send(());
        });

        hand.advance(Duration::from_millis(999));
        tokio::time::timeout(Duration::from_millis(50), &mut woke_rx)
            .await
            .expect_err("woke before the deadline");

        hand.advance(Duration::from_millis(1));
        woke_rx.await.unwrap();
        assert_eq!(hand.elapsed(), Duration::from_secs(1));
    }
}
