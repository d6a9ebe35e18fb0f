mod election_state;
mod primary_state;
mod state_change_listener;
mod timers;

pub(crate) use election_state::ElectionConfig;
pub(crate) use election_state::ElectionState;
pub(crate) use primary_state::PeerState;
pub(crate) use primary_state::PeerStateUpdate;
pub(crate) use primary_state::PrimaryStateTracker;
pub(crate) use primary_state::ProposeCallback;
pub(crate) use state_change_listener::ElectionStateChangeListener;
pub(crate) use state_change_listener::ElectionStateSnapshot;
