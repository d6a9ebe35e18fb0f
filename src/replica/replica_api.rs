use crate::commitlog::Sequence;
use crate::grpc::ProtoLogEntry;
use crate::replica::write_ahead_log::LogEntry;
use std::convert::TryFrom;
use crate::replica::{Epoch, ReplicaId};
use crate::store::{ApplyOutcome, Operation};
use std::io;
use std::net::SocketAddr;

/// (epoch, sequence) of a log entry. Logs are compared by their latest position.
pub(crate) type Position = (Epoch, Sequence);

/// The wire uses 0/0 for "no entry".
pub(crate) fn position_to_wire(position: Option<Position>) -> (u64, u64) {
    match position {
        None => (0, 0),
        Some((epoch, sequence)) => (epoch.as_u64(), sequence.as_u64()),
    }
}

pub(crate) fn position_from_wire(epoch: u64, sequence: u64) -> Option<Position> {
    Sequence::from_u64_opt(sequence).map(|sequence| (Epoch::new(epoch), sequence))
}

pub(crate) fn entry_to_wire(sequence: Sequence, entry: LogEntry) -> ProtoLogEntry {
    ProtoLogEntry {
        epoch: entry.epoch.as_u64(),
        sequence: sequence.as_u64(),
        data: entry.into(),
    }
}

pub(crate) fn entry_from_wire(proto_entry: ProtoLogEntry) -> Result<(Sequence, LogEntry), io::Error> {
    let sequence = Sequence::from_u64_opt(proto_entry.sequence)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "log entry at sequence 0"))?;
    let entry = LogEntry::try_from(proto_entry.data)?;
    if entry.epoch.as_u64() != proto_entry.epoch {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "log entry epoch mismatch: header says {}, payload says {:?}",
                proto_entry.epoch, entry.epoch
            ),
        ));
    }

    Ok((sequence, entry))
}

#[derive(Debug)]
pub(crate) struct ProposeInput {
    pub(crate) operation: Operation,
}

#[derive(Debug)]
pub(crate) struct ProposeOutput {
    pub(crate) sequence: Sequence,
    pub(crate) outcome: ApplyOutcome,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProposeError {
    #[error("I'm not primary")]
    NotPrimary { hint: Option<PrimaryHint> },

    // The entry may or may not commit later under another primary.
    #[error("Lost primacy before the entry committed")]
    LostPrimacy,

    #[error("Failed to persist log: {0}")]
    Durability(io::Error),

    #[error("Replica actor is dead RIP")]
    ActorExited,
}

/// Who we think is primary, and where its clients should connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryHint {
    pub replica_id: ReplicaId,
    pub client_addr: Option<SocketAddr>,
}

#[derive(Debug)]
pub(crate) struct EpochOutOfDateInfo {
    pub(crate) current_epoch: Epoch,
}

// -- RequestVote --

#[derive(Debug)]
pub(crate) struct RequestVoteInput {
    pub(crate) candidate_epoch: Epoch,
    pub(crate) candidate_id: ReplicaId,
    pub(crate) candidate_last_entry: Option<Position>,
}

#[derive(Debug)]
pub(crate) struct RequestVoteOutput {
    pub(crate) vote_granted: bool,
    // Voter's epoch after handling the request. Lets a stale candidate catch up.
    pub(crate) epoch: Epoch,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum RequestVoteError {
    #[error("Requesting candidate is not in the cluster")]
    CandidateNotInCluster,
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

// -- Heartbeat --

#[derive(Debug)]
pub(crate) struct HeartbeatInput {
    pub(crate) primary_epoch: Epoch,
    pub(crate) primary_id: ReplicaId,
    pub(crate) primary_commit: Option<Sequence>,
}

#[derive(Debug)]
pub(crate) struct HeartbeatOutput {
    pub(crate) latest: Option<Position>,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum HeartbeatError {
    #[error("Client is not in cluster")]
    ClientNotInCluster,
    #[error("Client's epoch is out of date")]
    ClientEpochOutOfDate(EpochOutOfDateInfo),
    #[error("Two primaries claim the same epoch")]
    DuplicatePrimary,
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

// -- AppendEntries --

#[derive(Debug)]
pub(crate) struct AppendEntriesInput {
    pub(crate) primary_epoch: Epoch,
    pub(crate) primary_id: ReplicaId,
    // "Previous log entry" is the log entry immediately preceding the new ones.
    pub(crate) primary_previous_entry: Option<Position>,
    pub(crate) primary_commit: Option<Sequence>,
    pub(crate) new_entries: Vec<LogEntry>,
}

#[derive(Debug)]
pub(crate) struct AppendEntriesOutput {
    pub(crate) latest: Option<Position>,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum AppendEntriesError {
    #[error("Client is not in cluster")]
    ClientNotInCluster,
    #[error("Client's epoch is out of date")]
    ClientEpochOutOfDate(EpochOutOfDateInfo),
    #[error("Two primaries claim the same epoch")]
    DuplicatePrimary,
    #[error("We (server) are missing previous log entry")]
    ServerMissingPreviousLogEntry { latest: Option<Sequence> },
    #[error("New entry conflicts with applied entry at {0:?}")]
    ConflictWithApplied(Sequence),
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

// -- RequestSync --

#[derive(Debug)]
pub(crate) struct RequestSyncInput {
    pub(crate) primary_epoch: Epoch,
    pub(crate) primary_id: ReplicaId,
    pub(crate) from: Sequence,
}

#[derive(Debug)]
pub(crate) struct RequestSyncOutput {
    pub(crate) latest: Option<Position>,
    pub(crate) entries: Vec<(Sequence, LogEntry)>,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum RequestSyncError {
    #[error("Client is not in cluster")]
    ClientNotInCluster,
    #[error("Client's epoch is out of date")]
    ClientEpochOutOfDate(EpochOutOfDateInfo),
    #[error("Two primaries claim the same epoch")]
    DuplicatePrimary,
    #[error("We (server) had an IO failure: {0:?}")]
    ServerIoError(io::Error),
    #[error("We (server) are unavailable because actor is dead RIP")]
    ActorExited,
}

// -- Replies from peers, delivered back to the actor --

#[derive(Debug)]
pub(crate) struct RequestVoteReplyFromPeer {
    pub(crate) peer_id: ReplicaId,
    pub(crate) epoch: Epoch,
    pub(crate) result: RequestVoteResult,
}

#[derive(Debug)]
pub(crate) enum RequestVoteResult {
    VoteGranted,
    VoteNotGranted { peer_epoch: Epoch },
    RetryableFailure,
    MalformedReply,
}

/// Reply to a Heartbeat or AppendEntries call. Heartbeats carry no entries and no previous entry.
#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeer {
    pub(crate) descriptor: AppendEntriesReplyFromPeerDescriptor,
    pub(crate) result: Result<Option<Position>, PeerReplyError>,
}

// This is basically info about the original request
#[derive(Debug)]
pub(crate) struct AppendEntriesReplyFromPeerDescriptor {
    pub(crate) peer_id: ReplicaId,
    pub(crate) epoch: Epoch,
    pub(crate) seq_no: u64,
    pub(crate) previous_sequence: Option<Sequence>,
    pub(crate) num_entries: usize,
}

#[derive(Debug)]
pub(crate) struct SyncReplyFromPeer {
    pub(crate) peer_id: ReplicaId,
    pub(crate) epoch: Epoch,
    pub(crate) result: Result<RequestSyncOutput, PeerReplyError>,
}

/// Failure of a call to a peer, as seen by the caller. Never surfaced to chat clients.
#[derive(Debug, thiserror::Error)]
pub(crate) enum PeerReplyError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
    #[error("Peer is on newer epoch {new_epoch:?}")]
    StaleEpoch { new_epoch: Epoch },
    #[error("Peer is missing previous entry; its log ends at {peer_latest:?}")]
    MissingPrevious { peer_latest: Option<Sequence> },
    #[error("Peer has a conflicting applied entry at {sequence:?}")]
    Conflict { sequence: Sequence },
    #[error("Peer fault: {0}")]
    Fault(String),
}

/// HeartbeatTick contains info for a single tick of a primary's per-peer timer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HeartbeatTick {
    pub(crate) peer_id: ReplicaId,
    pub(crate) epoch: Epoch,
}
