use crate::actor::WeakActorClient;
use crate::commitlog::Log;
use crate::replica::{
    ClusterTracker, DurableLog, ElectionStateChangeListener, LogEntry, PersistentLocalState, Replica, ReplicaConfig,
};
use crate::store::StateStore;
use std::io;
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct ReplicaTiming {
    pub heartbeat_interval: Duration,
    pub election_min_timeout: Duration,
    pub election_max_timeout: Duration,
    pub rpc_timeout: Duration,
    pub sync_timeout: Duration,
    pub max_entries_per_append: usize,
}

/// Recovers the durable log on top of `local_state`'s commit point, replaying committed entries
/// into `store`, then builds the replica around it.
pub(crate) fn create_replica<L, S>(
    logger: slog::Logger,
    cluster_tracker: ClusterTracker,
    log: L,
    local_state: S,
    store: StateStore,
    actor_client: WeakActorClient,
    initial_primary: bool,
    timing: ReplicaTiming,
) -> Result<(Replica<L, S>, ElectionStateChangeListener), io::Error>
where
    L: Log<LogEntry> + 'static,
    S: PersistentLocalState + 'static,
{
    let durable_log = DurableLog::new(logger.clone(), log, store, local_state.commit_sequence())?;

    Ok(Replica::new(ReplicaConfig {
        logger,
        cluster_tracker,
        durable_log,
        local_state,
        actor_client,
        initial_primary,
        heartbeat_interval: timing.heartbeat_interval,
        election_min_timeout: timing.election_min_timeout,
        election_max_timeout: timing.election_max_timeout,
        rpc_timeout: timing.rpc_timeout,
        sync_timeout: timing.sync_timeout,
        max_entries_per_append: timing.max_entries_per_append,
    }))
}
