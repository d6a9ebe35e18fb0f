use crate::actor;
use crate::replica::election::timers::deadline::{self, SharedDeadline};
use crate::replica::election::timers::clock::{Clock, TokioClock};
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// Held by a backup or candidate. While held, the task notifies the actor with `ElectionTimeout`
/// whenever `reset_timeout()` wasn't called for a random duration within the configured range.
pub(crate) struct ElectionTimerHandle<C: Clock = TokioClock> {
    next_wake_time: SharedDeadline,
    timeout_range: RangeInclusive<Duration>,
    clock: C,
    _to_drop: deadline::Stopper,
}

struct ElectionTimerTask<C: Clock> {
    next_wake_time: SharedDeadline,
    actor_client: actor::WeakActorClient,
    clock: C,
    stop_check: deadline::StopCheck,
    // Time between repeated timeout notifications while nothing resets us, so a lost election
    // gets retried without flooding the actor queue.
    retry_backoff: Duration,
}

impl ElectionTimerHandle {
    pub(crate) fn spawn_timer_task(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: actor::WeakActorClient,
    ) -> Self {
        let (task, handle) = ElectionTimerTask::new(min_timeout, max_timeout, actor_client, TokioClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock + Send + Sync + 'static> ElectionTimerHandle<C> {
    pub(crate) fn reset_timeout(&self) {
        self.next_wake_time.push_out(self.random_wake_time());
    }

    fn random_wake_time(&self) -> Instant {
        let jitter = rand::thread_rng().gen_range(self.timeout_range.clone());
        self.clock.now() + jitter
    }
}

impl<C: Clock + Send + Sync + 'static> ElectionTimerTask<C> {
    fn new(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: actor::WeakActorClient,
        clock: C,
    ) -> (Self, ElectionTimerHandle<C>) {
        let next_wake_time = SharedDeadline::new();
        let (stopper, stop_check) = deadline::stop_pair();

        let task = ElectionTimerTask {
            next_wake_time: next_wake_time.clone(),
            actor_client,
            clock: clock.clone(),
            stop_check,
            retry_backoff: min_timeout,
        };
        let handle = ElectionTimerHandle {
            next_wake_time,
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            clock,
            _to_drop: stopper,
        };

        // Start with a deadline, otherwise the task would time out right away.
        handle.reset_timeout();

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            match self.next_wake_time.take() {
                Some(wake_time) => {
                    self.clock.wait_until(wake_time).await;
                }
                None => {
                    // Nothing pushed the deadline out while we slept: no word from a primary.
                    if self.stop_check.should_stop() {
                        return;
                    }
                    if self.actor_client.election_timeout().await.is_err() {
                        return;
                    }
                    let retry_at = self.clock.now() + self.retry_backoff;
                    self.clock.wait_until(retry_at).await;
                }
            }

            // Handle dropped: role or epoch changed since we were spawned.
            if self.stop_check.should_stop() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::test_utils::TestUtilActor;
    use crate::replica::election::timers::clock::ManualClock;

    #[tokio::test]
    async fn resets_postpone_the_timeout() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut hand) = ManualClock::start();

        // No jitter, so min == max.
        let (timer_task, timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), clock);
        tokio::task::spawn(timer_task.run());
        actor.assert_no_event().await;

        // Heartbeats every half timeout keep us quiet. T=2.5 afterwards.
        for _ in 0..5 {
            hand.advance(timeout / 2);
            timer_handle.reset_timeout();
        }
        actor.assert_no_event().await;
        assert_eq!(hand.elapsed(), timeout * 5 / 2);

        // Last reset was at T=2.5, so nothing before T=3.5...
        let one_ns = Duration::from_nanos(1);
        hand.advance(timeout - one_ns);
        actor.assert_no_event().await;

        // ...and a timeout exactly at T=3.5.
        hand.advance(one_ns);
        actor.assert_election_timeout_event().await;
    }

    #[tokio::test]
    async fn reset_after_timeout_fired() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut hand) = ManualClock::start();

        let (timer_task, timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), clock);
        tokio::task::spawn(timer_task.run());

        hand.advance(timeout);
        actor.assert_election_timeout_event().await;

        // A reset after a timeout has fired still takes effect. The actor may have been handling
        // an AppendEntries while the timeout was queued.
        timer_handle.reset_timeout();
        for _ in 0..5 {
            hand.advance(timeout / 2);
            timer_handle.reset_timeout();
        }
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn dropping_handle_stops_task() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let mut actor = TestUtilActor::new(rx);
        let (clock, mut hand) = ManualClock::start();

        let (timer_task, timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());
        drop(timer_handle);

        hand.advance(timeout * 2);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn task_exits_when_actor_is_gone() {
        let timeout = Duration::from_millis(100);
        let (strong_actor_client, rx) = ActorClient::new(10);
        let (clock, mut hand) = ManualClock::start();

        let (timer_task, _timer_handle) =
            ElectionTimerTask::new(timeout, timeout, strong_actor_client.weak(), clock);
        let task_join_handle = tokio::task::spawn(timer_task.run());
        drop(strong_actor_client);
        drop(rx);

        hand.advance(timeout);
        task_join_handle.await.unwrap();
    }
}
