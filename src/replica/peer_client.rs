use crate::grpc::grpc_replication_client::GrpcReplicationClient;
use crate::grpc::{
    ProtoAppendEntriesReq, ProtoAppendEntriesResult, ProtoHeartbeatReq, ProtoHeartbeatResult, ProtoRequestSyncReq,
    ProtoRequestSyncResult, ProtoRequestVoteReq, ProtoRequestVoteResult,
};
use std::net::SocketAddr;
use tonic::codegen::http::uri;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// ReplicationClient calls one peer's replication service. The connection is established lazily
/// and re-established by tonic after failures, so a peer that is down at startup is fine.
#[derive(Clone)]
pub(crate) struct ReplicationClient {
    inner: GrpcReplicationClient<Channel>,
}

impl ReplicationClient {
    pub(crate) fn new(addr: SocketAddr) -> Result<Self, ConnectError> {
        let url = format!("http://{}", addr);
        let endpoint = Endpoint::from_shared(url)?;
        let channel = endpoint.connect_lazy()?;

        Ok(ReplicationClient {
            inner: GrpcReplicationClient::new(channel),
        })
    }

    pub(crate) async fn heartbeat(&mut self, request: ProtoHeartbeatReq) -> Result<ProtoHeartbeatResult, Status> {
        self.inner.heartbeat(request).await.map(|r| r.into_inner())
    }

    pub(crate) async fn append_entries(
        &mut self,
        request: ProtoAppendEntriesReq,
    ) -> Result<ProtoAppendEntriesResult, Status> {
        self.inner.append_entries(request).await.map(|r| r.into_inner())
    }

    pub(crate) async fn request_vote(&mut self, request: ProtoRequestVoteReq) -> Result<ProtoRequestVoteResult, Status> {
        self.inner.request_vote(request).await.map(|r| r.into_inner())
    }

    pub(crate) async fn request_sync(&mut self, request: ProtoRequestSyncReq) -> Result<ProtoRequestSyncResult, Status> {
        self.inner.request_sync(request).await.map(|r| r.into_inner())
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectError {
    #[error("invalid peer uri: {0}")]
    InvalidUri(#[from] uri::InvalidUri),
    #[error("can't set up channel: {0}")]
    Transport(#[from] tonic::transport::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn peer_that_is_down_still_gets_a_client() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut client = ReplicationClient::new(addr).unwrap();

        let result = client.heartbeat(ProtoHeartbeatReq::default()).await;
        assert!(result.is_err());
    }
}
