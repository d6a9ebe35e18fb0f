use crate::actor::{ActorClient, ReplicaActor};
use crate::api::options::ReplicationOptionsValidated;
use crate::api::{PeerConfig, RoleEventListener, ServerConfig};
use crate::commitlog::FileLog;
use crate::frontend::ClientListener;
use crate::processor::CommandProcessor;
use crate::replica::{
    self, ClusterTracker, FileLocalState, InvalidCluster, LogEntry, ReplicaId, ReplicaMetadata, ReplicaTiming,
};
use crate::server::{self, RpcServer, ShutdownHandle};
use crate::store::{StateStore, StoreSnapshot};
use std::convert::TryFrom;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

const LOG_FILE_NAME: &str = "wal.log";
const LOCAL_STATE_FILE_NAME: &str = "replica-state.json";

#[derive(Debug, thiserror::Error)]
pub enum ServerStartError {
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },
    #[error("Malformed config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Illegal replication options: {0}")]
    IllegalOptions(String),
    #[error("Can't resolve address of peer '{peer}': {reason}")]
    PeerAddress { peer: String, reason: String },
    #[error("Invalid cluster: {0}")]
    InvalidCluster(#[from] InvalidCluster),
    #[error("Storage initialization failure: {0}")]
    Storage(io::Error),
    #[error("Failed to bind client listener on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// A running server. Dropping the handle stops it, same as `shutdown()`.
pub struct ChatServerHandle {
    node_id: String,
    client_addr: SocketAddr,
    replication_addr: SocketAddr,
    store: StateStore,
    events: RoleEventListener,
    shutdown_handle: ShutdownHandle,
}

impl ChatServerHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Actual address of the client listener (differs from the config when it asked for port 0).
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn replication_addr(&self) -> SocketAddr {
        self.replication_addr
    }

    pub fn events(&self) -> RoleEventListener {
        self.events.clone()
    }

    /// Copy of everything this server has applied so far.
    pub fn store_snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn shutdown(self) {
        self.shutdown_handle.shutdown();
    }
}

/// Opens the log and local state under the data directory, replays committed entries, then starts
/// the replica actor, the replication RPC server and the client listener.
pub async fn try_start_server(config: ServerConfig, logger: slog::Logger) -> Result<ChatServerHandle, ServerStartError> {
    let logger = logger.new(slog::o!("node" => config.node_id.clone()));
    let options = ReplicationOptionsValidated::try_from(config.options.clone())
        .map_err(|e| ServerStartError::IllegalOptions(e.to_string()))?;

    let mut peers_metadata = Vec::with_capacity(config.peers.len());
    for peer in &config.peers {
        peers_metadata.push(resolve_peer(peer).await?);
    }
    let my_replica_id = ReplicaId::new(config.node_id.clone());
    let my_metadata = ReplicaMetadata::new(my_replica_id.clone(), config.replication_addr, Some(config.client_addr));
    let cluster_tracker = ClusterTracker::create_valid_cluster(my_metadata, peers_metadata)?;

    let log: FileLog<LogEntry> = FileLog::open(logger.clone(), config.data_dir.join(LOG_FILE_NAME)).map_err(ServerStartError::Storage)?;
    let local_state = FileLocalState::open(config.data_dir.join(LOCAL_STATE_FILE_NAME), my_replica_id)
        .map_err(ServerStartError::Storage)?;

    let store = StateStore::new();
    let (actor_client, actor_queue_rx) = ActorClient::new(64);
    let (replica, election_state_change_listener) = replica::create_replica(
        logger.clone(),
        cluster_tracker,
        log,
        local_state,
        store.clone(),
        actor_client.weak(),
        config.initial_primary,
        ReplicaTiming {
            heartbeat_interval: options.heartbeat_interval,
            election_min_timeout: options.election_timeout_min,
            election_max_timeout: options.election_timeout_max,
            rpc_timeout: options.rpc_timeout,
            sync_timeout: options.sync_timeout,
            max_entries_per_append: options.max_entries_per_append,
        },
    )
    .map_err(ServerStartError::Storage)?;

    let client_listener = ClientListener::bind(logger.clone(), config.client_addr)
        .await
        .map_err(|source| ServerStartError::Bind {
            addr: config.client_addr,
            source,
        })?;
    let client_addr = client_listener
        .local_addr()
        .map_err(|source| ServerStartError::Bind {
            addr: config.client_addr,
            source,
        })?;

    let (shutdown_handle, shutdown_signal) = server::shutdown_signal();

    let replica_actor = ReplicaActor::new(logger.clone(), actor_queue_rx, replica);
    tokio::spawn(replica_actor.run_event_loop(shutdown_signal.clone()));

    let rpc_server = RpcServer::new(logger.clone(), actor_client.weak());
    let rpc_logger = logger.clone();
    let replication_addr = config.replication_addr;
    let rpc_shutdown_signal = shutdown_signal.clone();
    tokio::spawn(async move {
        if let Err(e) = rpc_server.run(replication_addr, rpc_shutdown_signal).await {
            slog::crit!(rpc_logger, "Replication server on {} failed: {:?}", replication_addr, e);
        }
    });

    let processor = Arc::new(CommandProcessor::new(
        logger.clone(),
        actor_client,
        store.clone(),
        election_state_change_listener.clone(),
        options.commit_timeout,
    ));
    tokio::spawn(client_listener.run(processor, shutdown_signal));

    slog::info!(logger, "Serving clients on {}, replication on {}", client_addr, replication_addr);

    Ok(ChatServerHandle {
        node_id: config.node_id,
        client_addr,
        replication_addr,
        store,
        events: RoleEventListener::new(election_state_change_listener),
        shutdown_handle,
    })
}

async fn resolve_peer(peer: &PeerConfig) -> Result<ReplicaMetadata, ServerStartError> {
    let resolve_error = |reason: String| ServerStartError::PeerAddress {
        peer: peer.id.clone(),
        reason,
    };

    let replication_addr = tokio::net::lookup_host((peer.host.as_str(), peer.port))
        .await
        .map_err(|e| resolve_error(e.to_string()))?
        .next()
        .ok_or_else(|| resolve_error(format!("no addresses for host '{}'", peer.host)))?;
    let client_addr = peer
        .client_port
        .map(|port| SocketAddr::new(replication_addr.ip(), port));

    Ok(ReplicaMetadata::new(
        ReplicaId::new(peer.id.clone()),
        replication_addr,
        client_addr,
    ))
}
