use crate::replica::peer_client::ReplicationClient;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

/// ReplicaId identifies one chat server in the cluster. Ids are totally ordered; the lowest id
/// wins election ties.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(replica_id: impl Into<String>) -> Self {
        ReplicaId(replica_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub struct ReplicaMetadata {
    replica_id: ReplicaId,
    replication_addr: SocketAddr,
    // Where clients should go if this replica is primary. None if we don't know.
    client_addr: Option<SocketAddr>,
}

impl ReplicaMetadata {
    pub fn new(replica_id: ReplicaId, replication_addr: SocketAddr, client_addr: Option<SocketAddr>) -> Self {
        ReplicaMetadata {
            replica_id,
            replication_addr,
            client_addr,
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn replication_addr(&self) -> SocketAddr {
        self.replication_addr
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }
}

#[derive(Clone)]
pub(crate) struct Peer {
    pub(crate) metadata: ReplicaMetadata,
    pub(crate) client: ReplicationClient,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidCluster {
    #[error("replica {0:?} is listed more than once")]
    DuplicateReplica(ReplicaId),
    #[error("a replica's peer list can't contain itself ({0:?})")]
    PeerIsMe(ReplicaId),
    #[error("can't create replication client for {0:?}: {1}")]
    BadPeerAddress(ReplicaId, String),
}

/// ClusterTracker is the static membership of the cluster, as seen by one replica.
pub(crate) struct ClusterTracker {
    my_replica_metadata: ReplicaMetadata,
    peers: HashMap<ReplicaId, Peer>,
}

impl ClusterTracker {
    pub(crate) fn create_valid_cluster(
        my_replica_metadata: ReplicaMetadata,
        peers_metadata: Vec<ReplicaMetadata>,
    ) -> Result<Self, InvalidCluster> {
        let mut peers = HashMap::with_capacity(peers_metadata.len());
        for metadata in peers_metadata {
            let peer_id = metadata.replica_id().clone();
            if &peer_id == my_replica_metadata.replica_id() {
                return Err(InvalidCluster::PeerIsMe(peer_id));
            }
            if peers.contains_key(&peer_id) {
                return Err(InvalidCluster::DuplicateReplica(peer_id));
            }

            let client = ReplicationClient::new(metadata.replication_addr())
                .map_err(|e| InvalidCluster::BadPeerAddress(peer_id.clone(), e.to_string()))?;
            peers.insert(peer_id, Peer { metadata, client });
        }

        Ok(ClusterTracker {
            my_replica_metadata,
            peers,
        })
    }

    pub(crate) fn my_replica_id(&self) -> &ReplicaId {
        self.my_replica_metadata.replica_id()
    }

    pub(crate) fn metadata(&self, replica_id: &ReplicaId) -> Option<&ReplicaMetadata> {
        if replica_id == self.my_replica_id() {
            Some(&self.my_replica_metadata)
        } else {
            self.peers.get(replica_id).map(|peer| &peer.metadata)
        }
    }

    pub(crate) fn peer(&self, peer_id: &ReplicaId) -> Option<&Peer> {
        self.peers.get(peer_id)
    }

    pub(crate) fn peer_ids(&self) -> HashSet<ReplicaId> {
        self.peers.keys().cloned().collect()
    }

    pub(crate) fn iter_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub(crate) fn contains_member(&self, replica_id: &ReplicaId) -> bool {
        replica_id == self.my_replica_id() || self.peers.contains_key(replica_id)
    }

    /// Number of replicas that vote and acknowledge, including me.
    pub(crate) fn num_voting_replicas(&self) -> usize {
        self.peers.len() + 1
    }
}
