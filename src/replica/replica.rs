use crate::actor::WeakActorClient;
use crate::commitlog::{Log, Sequence};
use crate::grpc::{
    proto_append_entries_result, proto_heartbeat_result, proto_replication_error, proto_request_sync_result,
    proto_request_vote_result, ProtoAppendEntriesReq, ProtoAppendEntriesResult, ProtoHeartbeatReq,
    ProtoHeartbeatResult, ProtoReplicationError, ProtoRequestSyncReq, ProtoRequestSyncResult, ProtoRequestVoteReq,
};
use crate::replica::election::{
    ElectionConfig, ElectionState, ElectionStateChangeListener, PeerStateUpdate, ProposeCallback,
};
use crate::replica::local_state::{Epoch, PersistentLocalState};
use crate::replica::peer_client::ReplicationClient;
use crate::replica::peers::{ClusterTracker, ReplicaId};
use crate::replica::replica_api::{
    entry_from_wire, position_from_wire, position_to_wire, AppendEntriesError, AppendEntriesInput,
    AppendEntriesOutput, AppendEntriesReplyFromPeer, AppendEntriesReplyFromPeerDescriptor, EpochOutOfDateInfo,
    HeartbeatError, HeartbeatInput, HeartbeatOutput, HeartbeatTick, PeerReplyError, Position, PrimaryHint,
    ProposeError, ProposeInput, ProposeOutput, RequestSyncError, RequestSyncInput, RequestSyncOutput,
    RequestVoteError, RequestVoteInput, RequestVoteOutput, RequestVoteReplyFromPeer, RequestVoteResult,
    SyncReplyFromPeer,
};
use crate::replica::write_ahead_log::{DurableLog, LogEntry};
use crate::store::Operation;
use std::collections::{BTreeMap, HashSet};
use std::{cmp, io};
use tokio::time::error::Elapsed;
use tokio::time::Duration;
use tonic::Status;

pub(crate) struct ReplicaConfig<L, S>
where
    L: Log<LogEntry>,
    S: PersistentLocalState,
{
    pub logger: slog::Logger,
    pub cluster_tracker: ClusterTracker,
    pub durable_log: DurableLog<L>,
    pub local_state: S,
    pub actor_client: WeakActorClient,
    pub initial_primary: bool,
    pub heartbeat_interval: Duration,
    pub election_min_timeout: Duration,
    pub election_max_timeout: Duration,
    pub rpc_timeout: Duration,
    pub sync_timeout: Duration,
    pub max_entries_per_append: usize,
}

pub(crate) struct Replica<L, S>
where
    L: Log<LogEntry>,
    S: PersistentLocalState,
{
    logger: slog::Logger,
    my_replica_id: ReplicaId,
    cluster_tracker: ClusterTracker,
    local_state: S,
    election_state: ElectionState,
    durable_log: DurableLog<L>,
    actor_client: WeakActorClient,
    initial_primary: bool,
    rpc_timeout: Duration,
    sync_timeout: Duration,
    max_entries_per_append: usize,

    // Primary: proposals waiting for their entry to commit and apply.
    pending: BTreeMap<Sequence, ProposeCallback>,
    // Backup: highest sequence that passed the consistency check against the primary of that
    // epoch. Only this far may the primary's commit point be trusted.
    verified_through: Option<(Epoch, Sequence)>,
    // Set after a local durability failure. Cleared only by a restart.
    fenced: bool,
}

impl<L, S> Replica<L, S>
where
    L: Log<LogEntry> + 'static,
    S: PersistentLocalState + 'static,
{
    pub(crate) fn new(config: ReplicaConfig<L, S>) -> (Self, ElectionStateChangeListener) {
        let my_replica_id = config.cluster_tracker.my_replica_id().clone();
        let (election_state, election_state_change_listener) = ElectionState::new_backup(
            ElectionConfig {
                my_replica_id: my_replica_id.clone(),
                heartbeat_interval: config.heartbeat_interval,
                election_min_timeout: config.election_min_timeout,
                election_max_timeout: config.election_max_timeout,
            },
            config.actor_client.clone(),
        );

        let replica = Replica {
            logger: config.logger,
            my_replica_id,
            cluster_tracker: config.cluster_tracker,
            local_state: config.local_state,
            election_state,
            durable_log: config.durable_log,
            actor_client: config.actor_client,
            initial_primary: config.initial_primary,
            rpc_timeout: config.rpc_timeout,
            sync_timeout: config.sync_timeout,
            max_entries_per_append: config.max_entries_per_append,
            pending: BTreeMap::new(),
            verified_through: None,
            fenced: false,
        };

        (replica, election_state_change_listener)
    }

    /// Called once by the actor before it handles any event.
    pub(crate) fn start(&mut self) {
        if self.initial_primary {
            slog::info!(self.logger, "Configured as initial primary. Campaigning right away.");
            self.campaign();
        }
    }

    pub(crate) fn handle_propose(&mut self, input: ProposeInput, callback: ProposeCallback) {
        if self.fenced {
            callback.send(Err(ProposeError::Durability(fenced_error())));
            return;
        }
        if !self.election_state.is_primary() {
            callback.send(Err(ProposeError::NotPrimary {
                hint: self.election_state.primary_hint(),
            }));
            return;
        }
        if let Some(sync) = self.election_state.sync_phase_mut() {
            slog::debug!(self.logger, "Deferring {} until sync completes", input.operation.kind());
            sync.defer(input, callback);
            return;
        }

        let epoch = self.local_state.current_epoch();
        match self.durable_log.append(LogEntry::new(epoch, input.operation)) {
            Ok(sequence) => {
                self.pending.insert(sequence, callback);
                self.replicate_to_all_peers();
                // Single replica clusters commit right away.
                self.try_advance_primary_commit();
            }
            Err(e) => {
                callback.send(Err(ProposeError::Durability(copy_io_error(&e))));
                self.fence("append", e);
            }
        }
    }

    pub(crate) fn server_handle_request_vote(
        &mut self,
        input: RequestVoteInput,
    ) -> Result<RequestVoteOutput, RequestVoteError> {
        // Ensure candidate is known member.
        if !self.cluster_tracker.contains_member(&input.candidate_id) {
            return Err(RequestVoteError::CandidateNotInCluster);
        }

        // Read our local epoch/vote state as 1 atomic action.
        let (current_epoch, mut opt_voted_for) = self.local_state.voted_for_current_epoch();

        if input.candidate_epoch < current_epoch {
            slog::info!(
                self.logger,
                "Not granting vote to {:?}. Its epoch {:?} is behind ours {:?}.",
                input.candidate_id,
                input.candidate_epoch,
                current_epoch
            );
            return Ok(RequestVoteOutput {
                vote_granted: false,
                epoch: current_epoch,
            });
        }

        let increased = self
            .local_state
            .store_epoch_if_increased(input.candidate_epoch)
            .map_err(|e| RequestVoteError::ServerIoError(self.fence_and_report("store epoch", e)))?;
        if increased {
            self.step_down(None);
            slog::info!(
                self.logger,
                "Observed newer epoch {:?} in RequestVote. Election state: {:?}",
                input.candidate_epoch,
                self.election_state
            );
            // New epoch, so no vote cast yet.
            opt_voted_for = None;
        }

        if let Some(voted_for) = opt_voted_for {
            if *voted_for != input.candidate_id {
                slog::info!(self.logger, "Not granting vote. We already voted for {:?}.", voted_for);
                return Ok(self.vote_reply(false));
            }
        }

        // A fenced replica never campaigns itself, so it doesn't hold ties against others.
        let my_last_entry = self.durable_log.latest_entry();
        let eligible = Self::is_candidate_log_gte_mine(
            input.candidate_last_entry,
            &input.candidate_id,
            my_last_entry,
            &self.my_replica_id,
        ) || (self.fenced && input.candidate_last_entry >= my_last_entry);
        if !eligible {
            slog::info!(
                self.logger,
                "Not granting vote. Candidate {:?} log {:?} doesn't beat ours {:?}.",
                input.candidate_id,
                input.candidate_last_entry,
                my_last_entry
            );
            return Ok(self.vote_reply(false));
        }

        slog::info!(self.logger, "Voting for {:?} in epoch {:?}.", input.candidate_id, input.candidate_epoch);
        let cas_success = self
            .local_state
            .store_vote_for_epoch_if_unvoted(input.candidate_epoch, input.candidate_id.clone())
            .map_err(|e| RequestVoteError::ServerIoError(self.fence_and_report("store vote", e)))?;
        if cas_success {
            self.election_state.reset_timeout_if_backup();
            return Ok(self.vote_reply(true));
        }

        // Lost the CAS. If the winner cast the same vote we would have, the candidate retried.
        if let (reread_epoch, Some(reread_voted_for)) = self.local_state.voted_for_current_epoch() {
            if reread_epoch == input.candidate_epoch && reread_voted_for.as_ref() == &input.candidate_id {
                return Ok(self.vote_reply(true));
            }
        }

        Ok(self.vote_reply(false))
    }

    fn vote_reply(&self, vote_granted: bool) -> RequestVoteOutput {
        RequestVoteOutput {
            vote_granted,
            epoch: self.local_state.current_epoch(),
        }
    }

    /// Logs are compared by the position of their last entry: epoch first, then sequence. Equal
    /// logs go to the lower replica id, so exactly one of two equal candidates can win.
    fn is_candidate_log_gte_mine(
        candidate_last_entry: Option<Position>,
        candidate_id: &ReplicaId,
        my_last_entry: Option<Position>,
        my_id: &ReplicaId,
    ) -> bool {
        match candidate_last_entry.cmp(&my_last_entry) {
            cmp::Ordering::Greater => true,
            cmp::Ordering::Less => false,
            cmp::Ordering::Equal => candidate_id <= my_id,
        }
    }

    pub(crate) fn handle_request_vote_reply_from_peer(&mut self, reply: RequestVoteReplyFromPeer) {
        let current_epoch = self.local_state.current_epoch();
        if current_epoch != reply.epoch {
            slog::info!(
                self.logger,
                "Received vote for outdated epoch {:?}, current epoch: {:?}.",
                reply.epoch,
                current_epoch,
            );
            return;
        }

        match reply.result {
            RequestVoteResult::VoteGranted => {
                let num_votes_received = match self.election_state.add_vote_if_candidate(reply.peer_id) {
                    Some(v) => v,
                    None => {
                        slog::info!(
                            self.logger,
                            "Received vote for epoch {:?} after transitioning to election state: {:?}",
                            reply.epoch,
                            self.election_state,
                        );
                        return;
                    }
                };

                let num_voting_replicas = self.cluster_tracker.num_voting_replicas();
                slog::info!(
                    self.logger,
                    "Received {}/{} votes for epoch {:?}",
                    num_votes_received,
                    num_voting_replicas,
                    reply.epoch,
                );

                if num_votes_received >= Self::get_majority_vote_count(num_voting_replicas) {
                    self.become_primary(reply.epoch);
                }
            }
            RequestVoteResult::VoteNotGranted { peer_epoch } => {
                slog::info!(
                    self.logger,
                    "Vote not granted from {:?} for epoch {:?}",
                    reply.peer_id,
                    reply.epoch,
                );
                if peer_epoch > current_epoch {
                    match self.local_state.store_epoch_if_increased(peer_epoch) {
                        Ok(true) => {
                            self.step_down(None);
                            slog::info!(self.logger, "Peer is on newer epoch {:?}. Gave up candidacy.", peer_epoch);
                        }
                        Ok(false) => {}
                        Err(e) => self.fence("store epoch", e),
                    }
                }
            }
            RequestVoteResult::RetryableFailure => {
                if !self.election_state.is_candidate() {
                    return;
                }
                match self.cluster_tracker.peer(&reply.peer_id) {
                    Some(peer) => {
                        tokio::task::spawn(Self::call_peer_request_vote(
                            self.logger.clone(),
                            peer.client.clone(),
                            peer.metadata.replica_id().clone(),
                            self.new_request_vote_request(reply.epoch),
                            self.actor_client.clone(),
                            reply.epoch,
                            self.rpc_timeout,
                            // Unreachable peers fail fast. Don't spin on them.
                            self.rpc_timeout,
                        ));
                    }
                    None => {
                        slog::error!(
                            self.logger,
                            "Peer {:?} not found while retrying RequestVote",
                            reply.peer_id
                        );
                    }
                }
            }
            RequestVoteResult::MalformedReply => {
                slog::warn!(self.logger, "Malformed RequestVote reply from {:?}", reply.peer_id);
            }
        }
    }

    fn get_majority_vote_count(num_voting_replicas: usize) -> usize {
        (num_voting_replicas / 2) + 1
    }

    pub(crate) fn handle_election_timeout(&mut self) {
        if self.election_state.is_primary() {
            // Queued before we won.
            return;
        }
        slog::info!(self.logger, "Election timeout as {:?}", self.election_state);
        self.campaign();
    }

    fn campaign(&mut self) {
        if self.fenced {
            slog::warn!(self.logger, "Fenced after a durability failure. Not campaigning.");
            return;
        }

        // Write-ahead style: persist the vote for self before acting as candidate.
        let new_epoch = match self.local_state.increment_epoch_and_vote_for_self() {
            Ok(epoch) => epoch,
            Err(e) => {
                self.fence("start election", e);
                return;
            }
        };
        self.election_state.transition_to_candidate_and_vote_for_self();
        slog::info!(
            self.logger,
            "Campaigning for epoch {:?}. Election state: {:?}",
            new_epoch,
            self.election_state,
        );

        if Self::get_majority_vote_count(self.cluster_tracker.num_voting_replicas()) <= 1 {
            self.become_primary(new_epoch);
            return;
        }

        let rpc_request = self.new_request_vote_request(new_epoch);
        for peer in self.cluster_tracker.iter_peers() {
            tokio::task::spawn(Self::call_peer_request_vote(
                self.logger.clone(),
                peer.client.clone(),
                peer.metadata.replica_id().clone(),
                rpc_request.clone(),
                self.actor_client.clone(),
                new_epoch,
                self.rpc_timeout,
                Duration::from_millis(0),
            ));
        }
    }

    fn new_request_vote_request(&self, epoch: Epoch) -> ProtoRequestVoteReq {
        let (last_epoch, last_sequence) = position_to_wire(self.durable_log.latest_entry());

        ProtoRequestVoteReq {
            candidate_id: self.my_replica_id.as_str().to_string(),
            epoch: epoch.as_u64(),
            last_epoch,
            last_sequence,
        }
    }

    /// Won the election. Pull whatever peers have past our commit point before serving clients.
    fn become_primary(&mut self, epoch: Epoch) {
        let latest_sequence = self.durable_log.latest_entry().map(|(_, sequence)| sequence);
        self.election_state
            .transition_to_primary(epoch, self.cluster_tracker.peer_ids(), latest_sequence);
        slog::info!(
            self.logger,
            "Won election for epoch {:?}. Syncing with peers before serving clients.",
            epoch
        );

        if self.cluster_tracker.num_voting_replicas() == 1 {
            self.finish_sync_phase();
            return;
        }

        let from = self
            .durable_log
            .commit_sequence()
            .map(|commit| commit.plus(1))
            .unwrap_or_else(Sequence::start);
        let rpc_request = ProtoRequestSyncReq {
            primary_id: self.my_replica_id.as_str().to_string(),
            epoch: epoch.as_u64(),
            from_sequence: from.as_u64(),
        };
        for peer in self.cluster_tracker.iter_peers() {
            tokio::task::spawn(Self::call_peer_request_sync(
                self.logger.clone(),
                peer.client.clone(),
                peer.metadata.replica_id().clone(),
                rpc_request.clone(),
                self.actor_client.clone(),
                epoch,
                self.sync_timeout,
            ));
        }

        let actor_client = self.actor_client.clone();
        let sync_timeout = self.sync_timeout;
        tokio::task::spawn(async move {
            tokio::time::sleep(sync_timeout).await;
            actor_client.sync_timeout(epoch).await;
        });
    }

    pub(crate) fn handle_sync_reply_from_peer(&mut self, reply: SyncReplyFromPeer) {
        let current_epoch = self.local_state.current_epoch();
        if current_epoch != reply.epoch {
            slog::info!(self.logger, "Dropping sync reply for outdated epoch {:?}", reply.epoch);
            return;
        }

        let sync_output = match reply.result {
            Ok(output) => Some(output),
            Err(PeerReplyError::StaleEpoch { new_epoch }) => {
                match self.local_state.store_epoch_if_increased(new_epoch) {
                    Ok(true) => {
                        self.step_down(None);
                        slog::info!(self.logger, "Superseded by epoch {:?} while syncing.", new_epoch);
                        return;
                    }
                    Ok(false) => None,
                    Err(e) => {
                        self.fence("store epoch", e);
                        return;
                    }
                }
            }
            Err(e) => {
                slog::warn!(self.logger, "Sync with {:?} failed: {}", reply.peer_id, e);
                None
            }
        };

        let sync_complete = match self.election_state.sync_phase_mut() {
            Some(sync) => sync.record_reply(reply.peer_id, sync_output),
            None => return,
        };
        if sync_complete {
            self.finish_sync_phase();
        }
    }

    pub(crate) fn handle_sync_timeout(&mut self, epoch: Epoch) {
        if self.local_state.current_epoch() != epoch {
            return;
        }
        if let Some(sync) = self.election_state.sync_phase_mut() {
            slog::warn!(
                self.logger,
                "Sync timed out with {} replies. Proceeding without the rest.",
                sync.num_replies()
            );
            self.finish_sync_phase();
        }
    }

    fn finish_sync_phase(&mut self) {
        let sync = match self.election_state.finish_sync() {
            Some(sync) => sync,
            None => return,
        };
        let num_replies = sync.num_replies();
        let (replies, deferred) = sync.into_parts();

        // Anyone who voted for us is at or behind us, so only non-voters can be ahead. Their extra
        // entries are uncommitted; taking the furthest log keeps as many of them as possible.
        let my_latest = self.durable_log.latest_entry();
        let furthest = replies
            .into_iter()
            .filter(|(_, reply)| reply.latest > my_latest)
            .max_by_key(|(_, reply)| reply.latest);
        if let Some((peer_id, reply)) = furthest {
            slog::info!(
                self.logger,
                "Peer {:?} is ahead of us ({:?} > {:?}). Adopting {} entries.",
                peer_id,
                reply.latest,
                my_latest,
                reply.entries.len()
            );
            if let Err(e) = self.adopt_synced_entries(reply.entries) {
                self.fence("adopt synced entries", e);
                Self::fail_deferred(deferred, || ProposeError::Durability(fenced_error()));
                return;
            }
        }

        let latest_sequence = self.durable_log.latest_entry().map(|(_, sequence)| sequence);
        if let Some(primary_state) = self.election_state.primary_state_mut() {
            primary_state.restart_all_peers_after(latest_sequence);
        }

        // Every epoch opens with a marker. Applying it ends sessions issued by older primaries.
        let epoch = self.local_state.current_epoch();
        let marker = Operation::EpochStart {
            primary_id: self.my_replica_id.as_str().to_string(),
        };
        if let Err(e) = self.durable_log.append(LogEntry::new(epoch, marker)) {
            self.fence("append epoch start", e);
            Self::fail_deferred(deferred, || ProposeError::Durability(fenced_error()));
            return;
        }

        slog::info!(
            self.logger,
            "Sync complete with {} replies. Serving clients as primary for epoch {:?}.",
            num_replies,
            epoch
        );

        self.replicate_to_all_peers();
        self.try_advance_primary_commit();
        for (input, callback) in deferred {
            self.handle_propose(input, callback);
        }
    }

    fn adopt_synced_entries(&mut self, entries: Vec<(Sequence, LogEntry)>) -> Result<(), io::Error> {
        for (sequence, entry) in entries {
            match self.durable_log.epoch_at(sequence)? {
                Some(existing_epoch) if existing_epoch == entry.epoch => continue,
                Some(existing_epoch) => {
                    if matches!(self.durable_log.last_applied(), Some(applied) if sequence <= applied) {
                        slog::error!(
                            self.logger,
                            "Synced entry {:?} of epoch {:?} conflicts with our applied entry of epoch {:?}. Keeping ours.",
                            sequence,
                            entry.epoch,
                            existing_epoch
                        );
                        return Ok(());
                    }
                    slog::warn!(
                        self.logger,
                        "Replacing divergent entry {:?} of epoch {:?} with synced entry of epoch {:?}",
                        sequence,
                        existing_epoch,
                        entry.epoch
                    );
                    self.durable_log.truncate(sequence)?;
                }
                None => {}
            }

            let expected = self
                .durable_log
                .latest_entry()
                .map(|(_, latest)| latest.plus(1))
                .unwrap_or_else(Sequence::start);
            if sequence != expected {
                slog::error!(
                    self.logger,
                    "Synced entries have a gap: got {:?}, expected {:?}. Not adopting the rest.",
                    sequence,
                    expected
                );
                return Ok(());
            }
            self.durable_log.append(entry)?;
        }

        Ok(())
    }

    fn fail_deferred<F>(deferred: Vec<(ProposeInput, ProposeCallback)>, error: F)
    where
        F: Fn() -> ProposeError,
    {
        for (_, callback) in deferred {
            callback.send(Err(error()));
        }
    }

    pub(crate) fn handle_heartbeat_timer(&mut self, tick: HeartbeatTick) {
        let current_epoch = self.local_state.current_epoch();
        if current_epoch != tick.epoch {
            slog::warn!(
                self.logger,
                "Received heartbeat tick for outdated epoch {:?}, current epoch: {:?}",
                tick.epoch,
                current_epoch
            );
            return;
        }

        match self.try_contact_peer(&tick.peer_id, current_epoch) {
            Ok(_) => {}
            Err(ContactPeerError::NoLongerPrimary) => {
                slog::info!(self.logger, "Received heartbeat tick but no longer primary.")
            }
            Err(ContactPeerError::PeerConcurrencyThrottle) => {
                slog::debug!(self.logger, "Request to peer {:?} still outstanding", tick.peer_id)
            }
            Err(ContactPeerError::DiskRead(sequence, ioe)) => {
                slog::error!(self.logger, "Failed to read log entry at {:?}: {:?}", sequence, ioe);
            }
            Err(ContactPeerError::UnexpectedMissingLogEntry(sequence)) => {
                slog::error!(
                    self.logger,
                    "Peer tracker points at {:?}, but that entry is missing from the log.",
                    sequence
                );
            }
            Err(ContactPeerError::PrimaryStateMissingPeer { tracked_peers }) => {
                slog::error!(
                    self.logger,
                    "Peer {:?} is in the cluster but not tracked as primary. Tracked peers: [{:?}]",
                    tick.peer_id,
                    tracked_peers,
                )
            }
            Err(ContactPeerError::UnknownPeer) => {
                slog::error!(self.logger, "Missing peer {:?} in cluster", tick.peer_id);
            }
        }
    }

    fn replicate_to_all_peers(&mut self) {
        let current_epoch = self.local_state.current_epoch();
        for peer_id in self.cluster_tracker.peer_ids() {
            // Throttled peers get the entries with the reply to their outstanding request.
            let _ = self.try_contact_peer(&peer_id, current_epoch);
        }
    }

    /// Sends a Heartbeat while syncing, otherwise AppendEntries with whatever the peer is missing.
    fn try_contact_peer(&mut self, peer_id: &ReplicaId, current_epoch: Epoch) -> Result<(), ContactPeerError> {
        let peer = match self.cluster_tracker.peer(peer_id) {
            Some(peer) => peer.clone(),
            None => return Err(ContactPeerError::UnknownPeer),
        };
        let syncing = self.election_state.sync_phase_mut().is_some();
        let primary_state = match self.election_state.primary_state_mut() {
            Some(primary_state) => primary_state,
            None => return Err(ContactPeerError::NoLongerPrimary),
        };
        let peer_state = match primary_state.peer_state_mut(peer_id) {
            Some(peer_state) => peer_state,
            None => {
                return Err(ContactPeerError::PrimaryStateMissingPeer {
                    tracked_peers: primary_state.peer_ids(),
                })
            }
        };

        // One outstanding request per peer; no pipelining. Entries are still batched.
        if peer_state.has_outstanding_request() {
            return Err(ContactPeerError::PeerConcurrencyThrottle);
        }

        if syncing {
            let (latest_epoch, latest_sequence) = position_to_wire(self.durable_log.latest_entry());
            let rpc_request = ProtoHeartbeatReq {
                primary_id: self.my_replica_id.as_str().to_string(),
                epoch: current_epoch.as_u64(),
                commit_sequence: sequence_to_wire(self.durable_log.commit_sequence()),
                latest_epoch,
                latest_sequence,
            };
            let descriptor = AppendEntriesReplyFromPeerDescriptor {
                peer_id: peer_id.clone(),
                epoch: current_epoch,
                seq_no: peer_state.next_seq_no(),
                previous_sequence: None,
                num_entries: 0,
            };
            tokio::task::spawn(Self::call_peer_heartbeat(
                self.logger.clone(),
                peer.client,
                rpc_request,
                self.rpc_timeout,
                self.actor_client.clone(),
                descriptor,
            ));
        } else {
            let (rpc_request, previous_sequence, num_entries) = append_entries_builder::new_append_entries_request(
                current_epoch,
                &self.my_replica_id,
                peer_state,
                &self.durable_log,
                self.max_entries_per_append,
            )?;
            let descriptor = AppendEntriesReplyFromPeerDescriptor {
                peer_id: peer_id.clone(),
                epoch: current_epoch,
                seq_no: peer_state.next_seq_no(),
                previous_sequence,
                num_entries,
            };
            tokio::task::spawn(Self::call_peer_append_entries(
                self.logger.clone(),
                peer.client,
                rpc_request,
                self.rpc_timeout,
                self.actor_client.clone(),
                descriptor,
            ));
        }

        peer_state.reset_heartbeat_timer();

        Ok(())
    }

    pub(crate) fn handle_append_entries_reply_from_peer(&mut self, reply: AppendEntriesReplyFromPeer) {
        let logger = self.logger.new(slog::o!(
            "peer" => format!("{:?}", reply.descriptor.peer_id),
            "seq_no" => reply.descriptor.seq_no,
        ));
        slog::debug!(logger, "Reply from peer: {:?}", reply.result);

        let current_epoch = self.local_state.current_epoch();
        if current_epoch != reply.descriptor.epoch {
            slog::info!(
                logger,
                "Received reply for outdated epoch {:?}, but we're on epoch {:?}",
                reply.descriptor.epoch,
                current_epoch
            );
            return;
        }

        // 1. Check for stale epoch rejection
        let peer_update = match reply.result {
            Err(PeerReplyError::StaleEpoch { new_epoch }) => {
                slog::warn!(logger, "Rejected by peer because my epoch is stale.");
                match self.local_state.store_epoch_if_increased(new_epoch) {
                    Ok(true) => {
                        self.step_down(None);
                        slog::info!(logger, "Superseded by epoch {:?}. Stepped down.", new_epoch);
                        return;
                    }
                    Ok(false) => {
                        slog::warn!(logger, "Peer sent StaleEpoch without a newer epoch. Treating as generic failure.");
                        PeerStateUpdate::OtherError
                    }
                    Err(e) => {
                        self.fence("store epoch", e);
                        return;
                    }
                }
            }
            Err(PeerReplyError::MissingPrevious { peer_latest }) => {
                slog::info!(logger, "Peer is missing previous log entry. Its log ends at {:?}", peer_latest);
                PeerStateUpdate::PeerLogBehind { peer_latest }
            }
            Err(PeerReplyError::Conflict { sequence }) => {
                slog::error!(
                    logger,
                    "Peer has applied a different entry at {:?}. Replicas have diverged.",
                    sequence
                );
                PeerStateUpdate::OtherError
            }
            Err(e @ PeerReplyError::Unreachable(_)) => {
                slog::debug!(logger, "{}", e);
                PeerStateUpdate::OtherError
            }
            Err(e @ PeerReplyError::Fault(_)) => {
                slog::warn!(logger, "{}", e);
                PeerStateUpdate::OtherError
            }
            Ok(_) => PeerStateUpdate::Success {
                previous_sequence: reply.descriptor.previous_sequence,
                num_entries_replicated: reply.descriptor.num_entries,
            },
        };
        let made_progress = !matches!(peer_update, PeerStateUpdate::OtherError);

        // 2. Update peer log tracker
        let primary_state = match self.election_state.primary_state_mut() {
            Some(primary_state) => primary_state,
            None => {
                slog::info!(logger, "No longer primary");
                return;
            }
        };
        let peer_state = match primary_state.peer_state_mut(&reply.descriptor.peer_id) {
            Some(peer_state) => peer_state,
            None => {
                slog::warn!(logger, "Peer not tracked while handling reply");
                return;
            }
        };
        peer_state.handle_append_entries_result(&logger, reply.descriptor.seq_no, peer_update);
        let (next_sequence, _) = peer_state.next_and_previous_sequence();

        // 3. Check for quorum replication and apply new commits.
        self.try_advance_primary_commit();

        // 4. Keep going right away while the peer is behind. Failures wait for the next tick.
        if made_progress && self.election_state.sync_phase_mut().is_none() {
            if let Some((_, latest)) = self.durable_log.latest_entry() {
                if latest >= next_sequence {
                    let actor_client = self.actor_client.clone();
                    let tick = HeartbeatTick {
                        peer_id: reply.descriptor.peer_id,
                        epoch: reply.descriptor.epoch,
                    };
                    tokio::task::spawn(async move {
                        let _ = actor_client.heartbeat_timer(tick).await;
                    });
                }
            }
        }
    }

    fn try_advance_primary_commit(&mut self) {
        let peers_matched = match self.election_state.primary_state_mut() {
            Some(primary_state) => primary_state.peers_iter().map(|peer_state| peer_state.matched()).collect(),
            None => return,
        };
        let my_latest = self.durable_log.latest_entry().map(|(_, sequence)| sequence);
        let tentative_commit = match Self::get_cluster_commit_sequence(peers_matched, my_latest) {
            Some(tentative_commit) => tentative_commit,
            None => return,
        };

        // Only entries of our own epoch commit by counting; older ones ride along.
        match self
            .durable_log
            .ratchet_fwd_commit_sequence_if_valid(tentative_commit, self.local_state.current_epoch())
        {
            Ok(true) => self.persist_commit_and_apply(),
            Ok(false) => {}
            Err(e) => self.fence("advance commit", e),
        }
    }

    /// Highest sequence held by a majority of the cluster, counting us. We are at the tail since
    /// our log is the longest.
    fn get_cluster_commit_sequence(
        mut peers_matched: Vec<Option<Sequence>>,
        my_latest: Option<Sequence>,
    ) -> Option<Sequence> {
        if peers_matched.is_empty() {
            return my_latest;
        }

        peers_matched.sort();

        // With `p` peers, the cluster has `p + 1` members and a majority needs `p / 2` peers besides
        // us. Counting from the right, that's index `p / 2` from the left. The unit tests show it.
        let quorum_idx = peers_matched.len() / 2;

        peers_matched.remove(quorum_idx)
    }

    fn persist_commit_and_apply(&mut self) {
        if let Some(commit) = self.durable_log.commit_sequence() {
            if let Err(e) = self.local_state.store_commit_sequence(commit) {
                self.fence("persist commit", e);
                return;
            }
        }

        let outcomes = match self.durable_log.apply_all_committed_entries() {
            Ok(outcomes) => outcomes,
            Err(e) => {
                self.fence("apply", e);
                return;
            }
        };
        for (sequence, outcome) in outcomes {
            if let Some(callback) = self.pending.remove(&sequence) {
                callback.send(Ok(ProposeOutput { sequence, outcome }));
            }
        }
    }

    pub(crate) fn server_handle_heartbeat(&mut self, input: HeartbeatInput) -> Result<HeartbeatOutput, HeartbeatError> {
        if !self.cluster_tracker.contains_member(&input.primary_id) {
            return Err(HeartbeatError::ClientNotInCluster);
        }
        if self.fenced {
            return Err(HeartbeatError::ServerIoError(fenced_error()));
        }

        match self.observe_primary(input.primary_epoch, &input.primary_id) {
            Ok(PrimaryContact::Accepted) => {}
            Ok(PrimaryContact::StaleEpoch(current_epoch)) => {
                return Err(HeartbeatError::ClientEpochOutOfDate(EpochOutOfDateInfo { current_epoch }))
            }
            Ok(PrimaryContact::DuplicatePrimary) => return Err(HeartbeatError::DuplicatePrimary),
            Err(e) => return Err(HeartbeatError::ServerIoError(self.fence_and_report("store epoch", e))),
        }

        self.backup_advance_commit(input.primary_commit);

        Ok(HeartbeatOutput {
            latest: self.durable_log.latest_entry(),
        })
    }

    pub(crate) fn server_handle_append_entries(
        &mut self,
        input: AppendEntriesInput,
    ) -> Result<AppendEntriesOutput, AppendEntriesError> {
        if !self.cluster_tracker.contains_member(&input.primary_id) {
            return Err(AppendEntriesError::ClientNotInCluster);
        }
        if self.fenced {
            return Err(AppendEntriesError::ServerIoError(fenced_error()));
        }

        match self.observe_primary(input.primary_epoch, &input.primary_id) {
            Ok(PrimaryContact::Accepted) => {}
            Ok(PrimaryContact::StaleEpoch(current_epoch)) => {
                return Err(AppendEntriesError::ClientEpochOutOfDate(EpochOutOfDateInfo {
                    current_epoch,
                }))
            }
            Ok(PrimaryContact::DuplicatePrimary) => return Err(AppendEntriesError::DuplicatePrimary),
            Err(e) => return Err(AppendEntriesError::ServerIoError(self.fence_and_report("store epoch", e))),
        }

        // Reply false if our log doesn't contain an entry at the primary's previous sequence
        // whose epoch matches.
        if let Some((primary_previous_epoch, primary_previous_sequence)) = input.primary_previous_entry {
            match self.durable_log.epoch_at(primary_previous_sequence) {
                Ok(Some(my_previous_epoch)) if my_previous_epoch == primary_previous_epoch => {}
                Ok(_) => {
                    return Err(AppendEntriesError::ServerMissingPreviousLogEntry {
                        latest: self.durable_log.latest_entry().map(|(_, sequence)| sequence),
                    })
                }
                Err(e) => return Err(AppendEntriesError::ServerIoError(e)),
            }
        }

        // Skip entries we already have, replace a divergent unapplied tail, append the rest.
        let mut next_sequence = match input.primary_previous_entry {
            None => Sequence::start(),
            Some((_, previous_sequence)) => previous_sequence.plus(1),
        };
        for new_entry in input.new_entries {
            let opt_existing_epoch = self
                .durable_log
                .epoch_at(next_sequence)
                .map_err(AppendEntriesError::ServerIoError)?;

            if let Some(existing_epoch) = opt_existing_epoch {
                if existing_epoch == new_entry.epoch {
                    next_sequence = next_sequence.plus(1);
                    continue;
                }

                if matches!(self.durable_log.last_applied(), Some(applied) if next_sequence <= applied) {
                    slog::error!(
                        self.logger,
                        "Primary {:?} sent entry {:?} of epoch {:?}, but we applied one of epoch {:?} there",
                        input.primary_id,
                        next_sequence,
                        new_entry.epoch,
                        existing_epoch
                    );
                    return Err(AppendEntriesError::ConflictWithApplied(next_sequence));
                }
                slog::warn!(
                    self.logger,
                    "Truncating divergent tail at {:?} (epoch {:?}, primary has epoch {:?})",
                    next_sequence,
                    existing_epoch,
                    new_entry.epoch
                );
                self.durable_log
                    .truncate(next_sequence)
                    .map_err(AppendEntriesError::ServerIoError)?;
            }

            let appended_sequence = match self.durable_log.append(new_entry) {
                Ok(appended_sequence) => appended_sequence,
                Err(e) => return Err(AppendEntriesError::ServerIoError(self.fence_and_report("append", e))),
            };
            assert_eq!(
                appended_sequence, next_sequence,
                "Appended log entry at unexpected sequence."
            );

            next_sequence = next_sequence.plus(1);
        }

        // Everything up to here now matches the primary's log.
        let epoch = input.primary_epoch;
        if let Some(verified) = next_sequence.checked_minus(1) {
            self.verified_through = match self.verified_through {
                Some((verified_epoch, previous)) if verified_epoch == epoch => {
                    Some((epoch, cmp::max(previous, verified)))
                }
                _ => Some((epoch, verified)),
            };
        }
        self.backup_advance_commit(input.primary_commit);

        Ok(AppendEntriesOutput {
            latest: self.durable_log.latest_entry(),
        })
    }

    pub(crate) fn server_handle_request_sync(
        &mut self,
        input: RequestSyncInput,
    ) -> Result<RequestSyncOutput, RequestSyncError> {
        if !self.cluster_tracker.contains_member(&input.primary_id) {
            return Err(RequestSyncError::ClientNotInCluster);
        }

        match self.observe_primary(input.primary_epoch, &input.primary_id) {
            Ok(PrimaryContact::Accepted) => {}
            Ok(PrimaryContact::StaleEpoch(current_epoch)) => {
                return Err(RequestSyncError::ClientEpochOutOfDate(EpochOutOfDateInfo {
                    current_epoch,
                }))
            }
            Ok(PrimaryContact::DuplicatePrimary) => return Err(RequestSyncError::DuplicatePrimary),
            Err(e) => return Err(RequestSyncError::ServerIoError(self.fence_and_report("store epoch", e))),
        }

        let entries = self
            .durable_log
            .read_batch(input.from, usize::MAX)
            .map_err(RequestSyncError::ServerIoError)?;
        slog::info!(
            self.logger,
            "Sending {} entries from {:?} to new primary {:?}",
            entries.len(),
            input.from,
            input.primary_id
        );

        Ok(RequestSyncOutput {
            latest: self.durable_log.latest_entry(),
            entries,
        })
    }

    /// Common epoch handling for anything a primary sends us.
    fn observe_primary(&mut self, primary_epoch: Epoch, primary_id: &ReplicaId) -> Result<PrimaryContact, io::Error> {
        let current_epoch = self.local_state.current_epoch();
        if primary_epoch < current_epoch {
            return Ok(PrimaryContact::StaleEpoch(current_epoch));
        }

        let hint = self.primary_hint_for(primary_id);
        if self.local_state.store_epoch_if_increased(primary_epoch)? {
            self.step_down(Some(hint));
            slog::info!(
                self.logger,
                "Following primary {:?} of epoch {:?}. Election state: {:?}",
                primary_id,
                primary_epoch,
                self.election_state
            );
        } else if self.election_state.is_primary() {
            slog::error!(
                self.logger,
                "Replica {:?} claims primacy in our own epoch {:?}",
                primary_id,
                current_epoch
            );
            return Ok(PrimaryContact::DuplicatePrimary);
        } else if self.election_state.is_candidate() {
            // Someone else already won this epoch.
            self.step_down(Some(hint));
            slog::info!(self.logger, "Conceded epoch {:?} to {:?}", current_epoch, primary_id);
        } else {
            self.election_state.set_primary_if_unknown(&hint);
        }

        self.election_state.reset_timeout_if_backup();
        Ok(PrimaryContact::Accepted)
    }

    fn backup_advance_commit(&mut self, primary_commit: Option<Sequence>) {
        let current_epoch = self.local_state.current_epoch();
        let verified = match self.verified_through {
            Some((epoch, verified)) if epoch == current_epoch => verified,
            _ => return,
        };
        let primary_commit = match primary_commit {
            Some(primary_commit) => primary_commit,
            None => return,
        };

        if self
            .durable_log
            .ratchet_fwd_commit_sequence(cmp::min(primary_commit, verified))
        {
            self.persist_commit_and_apply();
        }
    }

    fn primary_hint_for(&self, primary_id: &ReplicaId) -> PrimaryHint {
        PrimaryHint {
            replica_id: primary_id.clone(),
            client_addr: self
                .cluster_tracker
                .metadata(primary_id)
                .and_then(|metadata| metadata.client_addr()),
        }
    }

    fn step_down(&mut self, primary: Option<PrimaryHint>) {
        let unfinished_sync = self.election_state.transition_to_backup(primary.clone());

        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            slog::info!(self.logger, "Failing {} uncommitted proposals", pending.len());
        }
        for (_, callback) in pending {
            callback.send(Err(ProposeError::LostPrimacy));
        }
        if let Some(sync) = unfinished_sync {
            let (_, deferred) = sync.into_parts();
            Self::fail_deferred(deferred, || ProposeError::NotPrimary { hint: primary.clone() });
        }
    }

    fn fence(&mut self, action: &str, e: io::Error) {
        slog::crit!(
            self.logger,
            "Durability failure during {}: {:?}. Fencing this replica until restart.",
            action,
            e
        );
        self.fenced = true;
        if self.election_state.is_primary() || self.election_state.is_candidate() {
            self.step_down(None);
        }
    }

    fn fence_and_report(&mut self, action: &str, e: io::Error) -> io::Error {
        let reported = copy_io_error(&e);
        self.fence(action, e);
        reported
    }

    async fn call_peer_request_vote(
        logger: slog::Logger,
        mut peer_client: ReplicationClient,
        peer_id: ReplicaId,
        rpc_request: ProtoRequestVoteReq,
        callback: WeakActorClient,
        epoch: Epoch,
        rpc_timeout: Duration,
        delay: Duration,
    ) {
        tokio::time::sleep(delay).await;

        slog::debug!(logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(rpc_timeout, peer_client.request_vote(rpc_request)).await;
        slog::debug!(logger, "ClientWire - {:?}", rpc_reply);

        let callback_result = match rpc_reply {
            Ok(Ok(rpc_result)) => match rpc_result.result {
                Some(proto_request_vote_result::Result::Ok(success_reply)) => {
                    if success_reply.vote_granted {
                        RequestVoteResult::VoteGranted
                    } else {
                        RequestVoteResult::VoteNotGranted {
                            peer_epoch: Epoch::new(success_reply.epoch),
                        }
                    }
                }
                Some(proto_request_vote_result::Result::Err(err)) => {
                    match Self::convert_replication_error(err) {
                        PeerReplyError::StaleEpoch { new_epoch } => {
                            RequestVoteResult::VoteNotGranted { peer_epoch: new_epoch }
                        }
                        PeerReplyError::Fault(message) => {
                            slog::warn!(logger, "RequestVote Service Fault: {:?}", message);
                            RequestVoteResult::RetryableFailure
                        }
                        other => {
                            slog::warn!(logger, "Unexpected RequestVote error: {}", other);
                            RequestVoteResult::MalformedReply
                        }
                    }
                }
                None => RequestVoteResult::MalformedReply,
            },
            Ok(Err(rpc_status)) => {
                slog::debug!(logger, "Un-modeled failure from RequestVote RPC call: {:?}", rpc_status);
                RequestVoteResult::RetryableFailure
            }
            Err(_timeout) => RequestVoteResult::RetryableFailure,
        };

        let callback_input = RequestVoteReplyFromPeer {
            peer_id,
            epoch,
            result: callback_result,
        };

        callback.notify_request_vote_reply_from_peer(callback_input).await;
    }

    async fn call_peer_heartbeat(
        logger: slog::Logger,
        mut peer_client: ReplicationClient,
        rpc_request: ProtoHeartbeatReq,
        rpc_timeout: Duration,
        callback: WeakActorClient,
        descriptor: AppendEntriesReplyFromPeerDescriptor,
    ) {
        slog::debug!(logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(rpc_timeout, peer_client.heartbeat(rpc_request)).await;
        slog::debug!(logger, "ClientWire - {:?}", rpc_reply);

        let callback_input = AppendEntriesReplyFromPeer {
            descriptor,
            result: Self::convert_heartbeat_rpc_reply(rpc_reply),
        };

        callback.notify_append_entries_reply_from_peer(callback_input).await;
    }

    async fn call_peer_append_entries(
        logger: slog::Logger,
        mut peer_client: ReplicationClient,
        rpc_request: ProtoAppendEntriesReq,
        rpc_timeout: Duration,
        callback: WeakActorClient,
        descriptor: AppendEntriesReplyFromPeerDescriptor,
    ) {
        slog::debug!(logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(rpc_timeout, peer_client.append_entries(rpc_request)).await;
        slog::debug!(logger, "ClientWire - {:?}", rpc_reply);

        let callback_input = AppendEntriesReplyFromPeer {
            descriptor,
            result: Self::convert_append_entries_rpc_reply(rpc_reply),
        };

        callback.notify_append_entries_reply_from_peer(callback_input).await;
    }

    async fn call_peer_request_sync(
        logger: slog::Logger,
        mut peer_client: ReplicationClient,
        peer_id: ReplicaId,
        rpc_request: ProtoRequestSyncReq,
        callback: WeakActorClient,
        epoch: Epoch,
        rpc_timeout: Duration,
    ) {
        slog::debug!(logger, "ClientWire - {:?}", rpc_request);
        let rpc_reply = tokio::time::timeout(rpc_timeout, peer_client.request_sync(rpc_request)).await;
        slog::debug!(logger, "ClientWire - {:?}", rpc_reply);

        let callback_input = SyncReplyFromPeer {
            peer_id,
            epoch,
            result: Self::convert_request_sync_rpc_reply(rpc_reply),
        };

        callback.notify_sync_reply_from_peer(callback_input).await;
    }

    fn convert_heartbeat_rpc_reply(
        rpc_reply: Result<Result<ProtoHeartbeatResult, Status>, Elapsed>,
    ) -> Result<Option<Position>, PeerReplyError> {
        match rpc_reply {
            Ok(Ok(rpc_result)) => match rpc_result.result {
                Some(proto_heartbeat_result::Result::Ok(success)) => {
                    Ok(position_from_wire(success.latest_epoch, success.latest_sequence))
                }
                Some(proto_heartbeat_result::Result::Err(err)) => Err(Self::convert_replication_error(err)),
                None => Err(PeerReplyError::Fault("Malformed Heartbeat result".into())),
            },
            Ok(Err(rpc_status)) => Err(PeerReplyError::Unreachable(format!("{:?}", rpc_status))),
            Err(_timeout) => Err(PeerReplyError::Unreachable("Timed out calling Heartbeat".into())),
        }
    }

    fn convert_append_entries_rpc_reply(
        rpc_reply: Result<Result<ProtoAppendEntriesResult, Status>, Elapsed>,
    ) -> Result<Option<Position>, PeerReplyError> {
        match rpc_reply {
            Ok(Ok(rpc_result)) => match rpc_result.result {
                Some(proto_append_entries_result::Result::Ok(ack)) => {
                    Ok(position_from_wire(ack.latest_epoch, ack.latest_sequence))
                }
                Some(proto_append_entries_result::Result::Err(err)) => Err(Self::convert_replication_error(err)),
                None => Err(PeerReplyError::Fault("Malformed AppendEntries result".into())),
            },
            Ok(Err(rpc_status)) => Err(PeerReplyError::Unreachable(format!("{:?}", rpc_status))),
            Err(_timeout) => Err(PeerReplyError::Unreachable("Timed out calling AppendEntries".into())),
        }
    }

    fn convert_request_sync_rpc_reply(
        rpc_reply: Result<Result<ProtoRequestSyncResult, Status>, Elapsed>,
    ) -> Result<RequestSyncOutput, PeerReplyError> {
        match rpc_reply {
            Ok(Ok(rpc_result)) => match rpc_result.result {
                Some(proto_request_sync_result::Result::Ok(sync_data)) => {
                    let entries = sync_data
                        .entries
                        .into_iter()
                        .map(entry_from_wire)
                        .collect::<Result<Vec<_>, io::Error>>()
                        .map_err(|e| PeerReplyError::Fault(format!("Malformed synced entry: {}", e)))?;
                    Ok(RequestSyncOutput {
                        latest: position_from_wire(sync_data.latest_epoch, sync_data.latest_sequence),
                        entries,
                    })
                }
                Some(proto_request_sync_result::Result::Err(err)) => Err(Self::convert_replication_error(err)),
                None => Err(PeerReplyError::Fault("Malformed RequestSync result".into())),
            },
            Ok(Err(rpc_status)) => Err(PeerReplyError::Unreachable(format!("{:?}", rpc_status))),
            Err(_timeout) => Err(PeerReplyError::Unreachable("Timed out calling RequestSync".into())),
        }
    }

    fn convert_replication_error(err: ProtoReplicationError) -> PeerReplyError {
        match err.err {
            Some(proto_replication_error::Err::ServerFault(payload)) => PeerReplyError::Fault(payload.message),
            Some(proto_replication_error::Err::StaleEpoch(payload)) => PeerReplyError::StaleEpoch {
                new_epoch: Epoch::new(payload.current_epoch),
            },
            Some(proto_replication_error::Err::MissingPrevious(payload)) => PeerReplyError::MissingPrevious {
                peer_latest: Sequence::from_u64_opt(payload.latest_sequence),
            },
            Some(proto_replication_error::Err::Conflict(payload)) => match Sequence::from_u64_opt(payload.sequence) {
                Some(sequence) => PeerReplyError::Conflict { sequence },
                None => PeerReplyError::Fault("Conflict reported at sequence 0".into()),
            },
            Some(proto_replication_error::Err::NotInCluster(_)) => {
                PeerReplyError::Fault("Peer doesn't think we're in the cluster".into())
            }
            None => PeerReplyError::Fault("Malformed replication error".into()),
        }
    }
}

enum PrimaryContact {
    Accepted,
    StaleEpoch(Epoch),
    DuplicatePrimary,
}

enum ContactPeerError {
    NoLongerPrimary,
    UnknownPeer,
    PeerConcurrencyThrottle,
    DiskRead(Sequence, io::Error),
    UnexpectedMissingLogEntry(Sequence),
    PrimaryStateMissingPeer { tracked_peers: HashSet<ReplicaId> },
}

fn sequence_to_wire(sequence: Option<Sequence>) -> u64 {
    sequence.map(|s| s.as_u64()).unwrap_or(0)
}

fn copy_io_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

fn fenced_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "replica is fenced after a durability failure",
    )
}

mod append_entries_builder {
    use super::{sequence_to_wire, ContactPeerError};
    use crate::commitlog::{Log, Sequence};
    use crate::grpc::ProtoAppendEntriesReq;
    use crate::replica::election::PeerState;
    use crate::replica::replica_api::{entry_to_wire, position_to_wire};
    use crate::replica::write_ahead_log::{DurableLog, LogEntry};
    use crate::replica::{Epoch, ReplicaId};

    /// Builds the next request for a peer from its tracker. Returns the request along with its
    /// previous sequence and number of entries, which its reply is matched against.
    pub(super) fn new_append_entries_request<L>(
        current_epoch: Epoch,
        my_id: &ReplicaId,
        peer_state: &PeerState,
        durable_log: &DurableLog<L>,
        max_entries: usize,
    ) -> Result<(ProtoAppendEntriesReq, Option<Sequence>, usize), ContactPeerError>
    where
        L: Log<LogEntry>,
    {
        let (next_sequence, opt_previous_sequence) = peer_state.next_and_previous_sequence();
        let previous_entry = match opt_previous_sequence {
            None => None,
            Some(previous_sequence) => match durable_log.epoch_at(previous_sequence) {
                Ok(Some(epoch)) => Some((epoch, previous_sequence)),
                Ok(None) => return Err(ContactPeerError::UnexpectedMissingLogEntry(previous_sequence)),
                Err(e) => return Err(ContactPeerError::DiskRead(previous_sequence, e)),
            },
        };

        let new_entries = durable_log
            .read_batch(next_sequence, max_entries)
            .map_err(|e| ContactPeerError::DiskRead(next_sequence, e))?;
        let num_entries = new_entries.len();

        let (previous_epoch, previous_sequence) = position_to_wire(previous_entry);
        let rpc_request = ProtoAppendEntriesReq {
            primary_id: my_id.as_str().to_string(),
            epoch: current_epoch.as_u64(),
            previous_epoch,
            previous_sequence,
            commit_sequence: sequence_to_wire(durable_log.commit_sequence()),
            entries: new_entries
                .into_iter()
                .map(|(sequence, entry)| entry_to_wire(sequence, entry))
                .collect(),
        };

        Ok((rpc_request, opt_previous_sequence, num_entries))
    }
}
