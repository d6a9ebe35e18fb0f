use crate::actor::WeakActorClient;
use crate::commitlog::Sequence;
use crate::grpc::grpc_replication_server::{GrpcReplication, GrpcReplicationServer};
use crate::grpc::{
    proto_append_entries_result, proto_heartbeat_result, proto_replication_error, proto_request_sync_result,
    proto_request_vote_result, ProtoAck, ProtoAppendEntriesReq, ProtoAppendEntriesResult, ProtoConflict,
    ProtoHeartbeatReq, ProtoHeartbeatResult, ProtoHeartbeatSuccess, ProtoMissingPrevious, ProtoNotInCluster,
    ProtoReplicationError, ProtoRequestSyncReq, ProtoRequestSyncResult, ProtoRequestVoteReq, ProtoRequestVoteResult,
    ProtoRequestVoteSuccess, ProtoServerFault, ProtoStaleEpoch, ProtoSyncData,
};
use crate::replica::{
    entry_from_wire, entry_to_wire, position_to_wire, AppendEntriesError, AppendEntriesInput, AppendEntriesOutput,
    Epoch, HeartbeatError, HeartbeatInput, HeartbeatOutput, Position, ReplicaId, RequestSyncError, RequestSyncInput,
    RequestSyncOutput, RequestVoteError, RequestVoteInput, RequestVoteOutput,
};
use crate::server::ShutdownSignal;
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RpcServer is the type that implements the replication gRPC interface.
pub(crate) struct RpcServer {
    logger: slog::Logger,
    local_replica: WeakActorClient,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_replica: WeakActorClient) -> Self {
        RpcServer { logger, local_replica }
    }

    pub(crate) async fn run(
        self,
        socket_addr: SocketAddr,
        mut shutdown_signal: ShutdownSignal,
    ) -> Result<(), tonic::transport::Error> {
        let logger = self.logger.clone();
        slog::info!(logger, "Replication server listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcReplicationServer::new(self))
            .serve_with_shutdown(socket_addr, async move { shutdown_signal.recv().await })
            .await;

        slog::info!(logger, "Replication server has exited: {:?}", result);
        result
    }

    async fn handle_heartbeat(&self, rpc_request: ProtoHeartbeatReq) -> Result<ProtoHeartbeatResult, Status> {
        let app_input = Self::convert_heartbeat_input(rpc_request)?;
        let app_result = self.local_replica.heartbeat(app_input).await;
        Ok(Self::convert_heartbeat_result(app_result))
    }

    fn convert_heartbeat_input(rpc_request: ProtoHeartbeatReq) -> Result<HeartbeatInput, Status> {
        Ok(HeartbeatInput {
            primary_epoch: Self::convert_epoch(rpc_request.epoch)?,
            primary_id: ReplicaId::new(rpc_request.primary_id),
            primary_commit: Sequence::from_u64_opt(rpc_request.commit_sequence),
        })
    }

    fn convert_heartbeat_result(app_result: Result<HeartbeatOutput, HeartbeatError>) -> ProtoHeartbeatResult {
        let result = match app_result {
            Ok(HeartbeatOutput { latest }) => {
                let (latest_epoch, latest_sequence) = position_to_wire(latest);
                proto_heartbeat_result::Result::Ok(ProtoHeartbeatSuccess {
                    latest_epoch,
                    latest_sequence,
                })
            }
            Err(HeartbeatError::ClientNotInCluster) => proto_heartbeat_result::Result::Err(Self::not_in_cluster()),
            Err(HeartbeatError::ClientEpochOutOfDate(info)) => {
                proto_heartbeat_result::Result::Err(Self::stale_epoch(info.current_epoch))
            }
            Err(HeartbeatError::DuplicatePrimary) => {
                proto_heartbeat_result::Result::Err(Self::server_fault("Receiver is primary of the same epoch"))
            }
            Err(HeartbeatError::ServerIoError(_)) => {
                proto_heartbeat_result::Result::Err(Self::server_fault("Local IO failure"))
            }
            Err(HeartbeatError::ActorExited) => {
                proto_heartbeat_result::Result::Err(Self::server_fault("Server internal replica task has exited"))
            }
        };

        ProtoHeartbeatResult { result: Some(result) }
    }

    async fn handle_append_entries(
        &self,
        rpc_request: ProtoAppendEntriesReq,
    ) -> Result<ProtoAppendEntriesResult, Status> {
        let app_input = Self::convert_append_entries_input(rpc_request)?;
        let app_result = self.local_replica.append_entries(app_input).await;
        Ok(Self::convert_append_entries_result(app_result))
    }

    fn convert_append_entries_input(rpc_request: ProtoAppendEntriesReq) -> Result<AppendEntriesInput, Status> {
        let primary_previous_entry =
            Self::convert_position(rpc_request.previous_epoch, rpc_request.previous_sequence)?;

        // Entries must continue right after the previous entry, with no gaps.
        let mut expected_sequence = match primary_previous_entry {
            None => Sequence::start(),
            Some((_, previous_sequence)) => previous_sequence.plus(1),
        };
        let mut new_entries = Vec::with_capacity(rpc_request.entries.len());
        for proto_entry in rpc_request.entries {
            let (sequence, entry) =
                entry_from_wire(proto_entry).map_err(|e| Status::invalid_argument(e.to_string()))?;
            if sequence != expected_sequence {
                return Err(Status::invalid_argument(format!(
                    "Entry at sequence {:?}, expected {:?}",
                    sequence, expected_sequence
                )));
            }
            expected_sequence = expected_sequence.plus(1);
            new_entries.push(entry);
        }

        Ok(AppendEntriesInput {
            primary_epoch: Self::convert_epoch(rpc_request.epoch)?,
            primary_id: ReplicaId::new(rpc_request.primary_id),
            primary_previous_entry,
            primary_commit: Sequence::from_u64_opt(rpc_request.commit_sequence),
            new_entries,
        })
    }

    fn convert_append_entries_result(
        app_result: Result<AppendEntriesOutput, AppendEntriesError>,
    ) -> ProtoAppendEntriesResult {
        let result = match app_result {
            Ok(AppendEntriesOutput { latest }) => {
                let (latest_epoch, latest_sequence) = position_to_wire(latest);
                proto_append_entries_result::Result::Ok(ProtoAck {
                    latest_epoch,
                    latest_sequence,
                })
            }
            Err(AppendEntriesError::ClientNotInCluster) => {
                proto_append_entries_result::Result::Err(Self::not_in_cluster())
            }
            Err(AppendEntriesError::ClientEpochOutOfDate(info)) => {
                proto_append_entries_result::Result::Err(Self::stale_epoch(info.current_epoch))
            }
            Err(AppendEntriesError::DuplicatePrimary) => {
                proto_append_entries_result::Result::Err(Self::server_fault("Receiver is primary of the same epoch"))
            }
            Err(AppendEntriesError::ServerMissingPreviousLogEntry { latest }) => {
                proto_append_entries_result::Result::Err(ProtoReplicationError {
                    err: Some(proto_replication_error::Err::MissingPrevious(ProtoMissingPrevious {
                        latest_sequence: latest.map(|s| s.as_u64()).unwrap_or(0),
                    })),
                })
            }
            Err(AppendEntriesError::ConflictWithApplied(sequence)) => {
                proto_append_entries_result::Result::Err(ProtoReplicationError {
                    err: Some(proto_replication_error::Err::Conflict(ProtoConflict {
                        sequence: sequence.as_u64(),
                    })),
                })
            }
            Err(AppendEntriesError::ServerIoError(_)) => {
                proto_append_entries_result::Result::Err(Self::server_fault("Local IO failure"))
            }
            Err(AppendEntriesError::ActorExited) => {
                proto_append_entries_result::Result::Err(Self::server_fault("Server internal replica task has exited"))
            }
        };

        ProtoAppendEntriesResult { result: Some(result) }
    }

    async fn handle_request_vote(&self, rpc_request: ProtoRequestVoteReq) -> Result<ProtoRequestVoteResult, Status> {
        let app_input = Self::convert_request_vote_input(rpc_request)?;
        let app_result = self.local_replica.request_vote(app_input).await;
        Ok(Self::convert_request_vote_result(app_result))
    }

    fn convert_request_vote_input(rpc_request: ProtoRequestVoteReq) -> Result<RequestVoteInput, Status> {
        Ok(RequestVoteInput {
            candidate_epoch: Self::convert_epoch(rpc_request.epoch)?,
            candidate_id: ReplicaId::new(rpc_request.candidate_id),
            candidate_last_entry: Self::convert_position(rpc_request.last_epoch, rpc_request.last_sequence)?,
        })
    }

    fn convert_request_vote_result(app_result: Result<RequestVoteOutput, RequestVoteError>) -> ProtoRequestVoteResult {
        let result = match app_result {
            Ok(RequestVoteOutput { vote_granted, epoch }) => {
                proto_request_vote_result::Result::Ok(ProtoRequestVoteSuccess {
                    vote_granted,
                    epoch: epoch.as_u64(),
                })
            }
            Err(RequestVoteError::CandidateNotInCluster) => {
                proto_request_vote_result::Result::Err(Self::not_in_cluster())
            }
            Err(RequestVoteError::ServerIoError(_)) => {
                proto_request_vote_result::Result::Err(Self::server_fault("Local IO failure"))
            }
            Err(RequestVoteError::ActorExited) => {
                proto_request_vote_result::Result::Err(Self::server_fault("Server internal replica task has exited"))
            }
        };

        ProtoRequestVoteResult { result: Some(result) }
    }

    async fn handle_request_sync(&self, rpc_request: ProtoRequestSyncReq) -> Result<ProtoRequestSyncResult, Status> {
        let app_input = Self::convert_request_sync_input(rpc_request)?;
        let app_result = self.local_replica.request_sync(app_input).await;
        Ok(Self::convert_request_sync_result(app_result))
    }

    fn convert_request_sync_input(rpc_request: ProtoRequestSyncReq) -> Result<RequestSyncInput, Status> {
        Ok(RequestSyncInput {
            primary_epoch: Self::convert_epoch(rpc_request.epoch)?,
            primary_id: ReplicaId::new(rpc_request.primary_id),
            from: Sequence::from_u64_opt(rpc_request.from_sequence).unwrap_or_else(Sequence::start),
        })
    }

    fn convert_request_sync_result(app_result: Result<RequestSyncOutput, RequestSyncError>) -> ProtoRequestSyncResult {
        let result = match app_result {
            Ok(RequestSyncOutput { latest, entries }) => {
                let (latest_epoch, latest_sequence) = position_to_wire(latest);
                proto_request_sync_result::Result::Ok(ProtoSyncData {
                    latest_epoch,
                    latest_sequence,
                    entries: entries
                        .into_iter()
                        .map(|(sequence, entry)| entry_to_wire(sequence, entry))
                        .collect(),
                })
            }
            Err(RequestSyncError::ClientNotInCluster) => proto_request_sync_result::Result::Err(Self::not_in_cluster()),
            Err(RequestSyncError::ClientEpochOutOfDate(info)) => {
                proto_request_sync_result::Result::Err(Self::stale_epoch(info.current_epoch))
            }
            Err(RequestSyncError::DuplicatePrimary) => {
                proto_request_sync_result::Result::Err(Self::server_fault("Receiver is primary of the same epoch"))
            }
            Err(RequestSyncError::ServerIoError(_)) => {
                proto_request_sync_result::Result::Err(Self::server_fault("Local IO failure"))
            }
            Err(RequestSyncError::ActorExited) => {
                proto_request_sync_result::Result::Err(Self::server_fault("Server internal replica task has exited"))
            }
        };

        ProtoRequestSyncResult { result: Some(result) }
    }

    fn convert_epoch(epoch: u64) -> Result<Epoch, Status> {
        match epoch {
            0 => Err(Status::invalid_argument("Epoch 0 is never used by a primary or candidate")),
            epoch => Ok(Epoch::new(epoch)),
        }
    }

    fn convert_position(epoch: u64, sequence: u64) -> Result<Option<Position>, Status> {
        match (epoch, sequence) {
            (0, 0) => Ok(None),
            (0, _) => Err(Status::invalid_argument("Epoch 0 and Sequence non-0")),
            (_, 0) => Err(Status::invalid_argument("Sequence 0 and Epoch non-0")),
            (epoch, sequence) => Ok(Some((Epoch::new(epoch), Sequence::new(sequence)))),
        }
    }

    fn not_in_cluster() -> ProtoReplicationError {
        ProtoReplicationError {
            err: Some(proto_replication_error::Err::NotInCluster(ProtoNotInCluster {})),
        }
    }

    fn stale_epoch(current_epoch: Epoch) -> ProtoReplicationError {
        ProtoReplicationError {
            err: Some(proto_replication_error::Err::StaleEpoch(ProtoStaleEpoch {
                current_epoch: current_epoch.as_u64(),
            })),
        }
    }

    fn server_fault(message: &str) -> ProtoReplicationError {
        ProtoReplicationError {
            err: Some(proto_replication_error::Err::ServerFault(ProtoServerFault {
                message: message.to_string(),
            })),
        }
    }
}

#[async_trait::async_trait]
impl GrpcReplication for RpcServer {
    async fn heartbeat(
        &self,
        rpc_request_wrapped: Request<ProtoHeartbeatReq>,
    ) -> Result<Response<ProtoHeartbeatResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_heartbeat(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn append_entries(
        &self,
        rpc_request_wrapped: Request<ProtoAppendEntriesReq>,
    ) -> Result<Response<ProtoAppendEntriesResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_append_entries(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn request_vote(
        &self,
        rpc_request_wrapped: Request<ProtoRequestVoteReq>,
    ) -> Result<Response<ProtoRequestVoteResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_request_vote(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn request_sync(
        &self,
        rpc_request_wrapped: Request<ProtoRequestSyncReq>,
    ) -> Result<Response<ProtoRequestSyncResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_request_sync(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_zero_means_empty() {
        assert_eq!(RpcServer::convert_position(0, 0).unwrap(), None);
        assert_eq!(
            RpcServer::convert_position(2, 7).unwrap(),
            Some((Epoch::new(2), Sequence::new(7)))
        );
        assert!(RpcServer::convert_position(0, 7).is_err());
        assert!(RpcServer::convert_position(2, 0).is_err());
    }

    #[test]
    fn stale_epoch_carries_current_epoch() {
        let result = RpcServer::convert_heartbeat_result(Err(HeartbeatError::ClientEpochOutOfDate(
            crate::replica::EpochOutOfDateInfo {
                current_epoch: Epoch::new(4),
            },
        )));
        match result.result {
            Some(proto_heartbeat_result::Result::Err(ProtoReplicationError {
                err: Some(proto_replication_error::Err::StaleEpoch(payload)),
            })) => assert_eq!(payload.current_epoch, 4),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn append_entries_with_gap_is_rejected() {
        use crate::replica::LogEntry;
        use crate::store::Operation;

        let entry = LogEntry::new(
            Epoch::new(1),
            Operation::EpochStart {
                primary_id: "a".to_string(),
            },
        );
        let request = ProtoAppendEntriesReq {
            primary_id: "a".to_string(),
            epoch: 1,
            previous_epoch: 0,
            previous_sequence: 0,
            commit_sequence: 0,
            entries: vec![entry_to_wire(Sequence::new(2), entry)],
        };
        assert!(RpcServer::convert_append_entries_input(request).is_err());
    }
}
