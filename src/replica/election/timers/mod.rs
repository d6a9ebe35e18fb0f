mod deadline;
mod election_timer;
mod heartbeat_timer;
mod clock;

#[cfg(test)]
mod test_utils;

pub(super) use election_timer::ElectionTimerHandle;
pub(super) use heartbeat_timer::HeartbeatTimerHandle;
