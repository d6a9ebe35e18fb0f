mod election;
mod local_state;
mod peer_client;
mod peers;
mod replica;
mod replica_api;
mod replica_wiring;
mod write_ahead_log;

pub(crate) use election::ElectionStateChangeListener;
pub(crate) use election::ElectionStateSnapshot;
pub use local_state::Epoch;
pub(crate) use local_state::FileLocalState;
pub(crate) use local_state::PersistentLocalState;
pub(crate) use local_state::VolatileLocalState;
pub(crate) use peers::ClusterTracker;
pub use peers::InvalidCluster;
pub use peers::ReplicaId;
pub use peers::ReplicaMetadata;
pub(crate) use replica::Replica;
pub(crate) use replica::ReplicaConfig;
pub use replica_api::PrimaryHint;
pub(crate) use replica_api::*;
pub(crate) use replica_wiring::create_replica;
pub(crate) use replica_wiring::ReplicaTiming;
pub(crate) use write_ahead_log::DurableLog;
pub(crate) use write_ahead_log::LogEntry;
