use crate::replica::election::timers::deadline::SharedDeadline;
use crate::replica::election::timers::clock::{Clock, TokioClock};
use crate::{actor, replica};
use std::sync::{Arc, Weak};
use tokio::time::{Duration, Instant};

/// Held by a primary, one per peer. While held, the task asks the actor to contact the peer
/// whenever nothing was sent to it for one heartbeat interval.
pub(crate) struct HeartbeatTimerHandle<C: Clock = TokioClock> {
    shared: Arc<Shared<C>>,
}

struct Shared<C: Clock> {
    heartbeat_interval: Duration,
    next_heartbeat_time: SharedDeadline,
    clock: C,
}

struct HeartbeatTimerTask<C: Clock> {
    weak_shared: Weak<Shared<C>>,
    next_heartbeat_time: SharedDeadline,
    actor_client: actor::WeakActorClient,
    tick: replica::HeartbeatTick,
    clock: C,
}

impl HeartbeatTimerHandle {
    pub(crate) fn spawn_timer_task(
        heartbeat_interval: Duration,
        actor_client: actor::WeakActorClient,
        peer_id: replica::ReplicaId,
        epoch: replica::Epoch,
    ) -> Self {
        let (task, handle) = HeartbeatTimerTask::new(heartbeat_interval, actor_client, peer_id, epoch, TokioClock);
        tokio::task::spawn(task.run());

        handle
    }
}

impl<C: Clock + Send + Sync + 'static> HeartbeatTimerHandle<C> {
    /// Called whenever we send anything to the peer; the next tick is one interval from now.
    pub(crate) fn reset_heartbeat_timer(&self) {
        self.shared.reset_heartbeat_timer();
    }
}

impl<C: Clock> Shared<C> {
    fn reset_heartbeat_timer(&self) {
        self.next_heartbeat_time
            .push_out(self.clock.now() + self.heartbeat_interval);
    }
}

impl<C: Clock> HeartbeatTimerTask<C> {
    fn new(
        heartbeat_interval: Duration,
        actor_client: actor::WeakActorClient,
        peer_id: replica::ReplicaId,
        epoch: replica::Epoch,
        clock: C,
    ) -> (Self, HeartbeatTimerHandle<C>) {
        let next_heartbeat_time = SharedDeadline::new();
        let shared = Arc::new(Shared {
            heartbeat_interval,
            next_heartbeat_time: next_heartbeat_time.clone(),
            clock: clock.clone(),
        });

        let task = HeartbeatTimerTask {
            weak_shared: Arc::downgrade(&shared),
            next_heartbeat_time,
            actor_client,
            tick: replica::HeartbeatTick { peer_id, epoch },
            clock,
        };

        (task, HeartbeatTimerHandle { shared })
    }

    async fn run(mut self) {
        // The deadline starts empty, so the first tick goes out immediately: a new primary
        // announces itself to every peer right away.
        loop {
            match self.next_heartbeat_time.take() {
                Some(wake_time) => {
                    self.clock.wait_until(wake_time).await;
                }
                None => match self.weak_shared.upgrade() {
                    Some(shared) => {
                        if self.actor_client.heartbeat_timer(self.tick.clone()).await.is_err() {
                            return;
                        }
                        shared.reset_heartbeat_timer();
                    }
                    // Handle dropped: we're no longer primary for this epoch.
                    None => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::test_utils::TestUtilActor;
    use crate::replica::election::timers::clock::{ClockHand, ManualClock};
    use crate::replica::{Epoch, HeartbeatTick, ReplicaId};

    fn setup(
        interval: Duration,
    ) -> (
        ActorClient,
        TestUtilActor,
        HeartbeatTimerHandle<ManualClock>,
        HeartbeatTimerTask<ManualClock>,
        ClockHand,
        HeartbeatTick,
    ) {
        let (strong_actor_client, rx) = ActorClient::new(10);
        let actor = TestUtilActor::new(rx);
        let (manual_clock, hand) = ManualClock::start();

        let peer_id = ReplicaId::new("peer-123");
        let epoch = Epoch::new(10);
        let (task, handle) =
            HeartbeatTimerTask::new(interval, strong_actor_client.weak(), peer_id.clone(), epoch, manual_clock);

        (
            strong_actor_client,
            actor,
            handle,
            task,
            hand,
            HeartbeatTick { peer_id, epoch },
        )
    }

    #[tokio::test]
    async fn ticks_every_interval_until_dropped() {
        let interval = Duration::from_millis(100);
        let (_client, mut actor, handle, task, mut clock, expected) = setup(interval);
        let task_join_handle = tokio::task::spawn(task.run());

        // Immediate first tick.
        actor.assert_heartbeat_event(expected.clone()).await;
        actor.assert_no_event().await;

        for _ in 0..3 {
            clock.advance(interval);
            actor.assert_heartbeat_event(expected.clone()).await;
            actor.assert_no_event().await;
        }

        // A long gap still produces a single tick.
        clock.advance(interval * 5);
        actor.assert_heartbeat_event(expected.clone()).await;
        actor.assert_no_event().await;

        drop(handle);
        clock.advance(interval);
        task_join_handle.await.unwrap();
        actor.assert_no_event().await;
    }

    #[tokio::test]
    async fn sending_traffic_postpones_tick() {
        let interval = Duration::from_millis(100);
        let (_client, mut actor, handle, task, mut clock, expected) = setup(interval);
        tokio::task::spawn(task.run());

        actor.assert_heartbeat_event(expected.clone()).await;

        // Replication traffic every half interval. T=2.5 afterwards, next tick due at T=3.5.
        for _ in 0..5 {
            clock.advance(interval / 2);
            handle.reset_heartbeat_timer();
        }
        actor.assert_no_event().await;
        assert_eq!(clock.elapsed(), interval * 5 / 2);

        clock.advance(interval / 2);
        actor.assert_no_event().await;

        clock.advance(interval / 2);
        actor.assert_heartbeat_event(expected).await;
        assert_eq!(clock.elapsed(), interval * 7 / 2);
    }
}
