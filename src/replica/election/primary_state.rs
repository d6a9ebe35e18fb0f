use crate::actor::Callback;
use crate::commitlog::Sequence;
use crate::replica::election::timers::HeartbeatTimerHandle;
use crate::replica::{ProposeError, ProposeInput, ProposeOutput, ReplicaId, RequestSyncOutput};
use std::cmp;
use std::collections::{HashMap, HashSet};

pub(crate) struct PrimaryStateTracker {
    peer_state: HashMap<ReplicaId, PeerState>,
}

impl PrimaryStateTracker {
    pub(super) fn new(peer_state: HashMap<ReplicaId, PeerState>) -> Self {
        PrimaryStateTracker { peer_state }
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    pub(crate) fn peer_ids(&self) -> HashSet<ReplicaId> {
        self.peer_state.keys().cloned().collect()
    }

    pub(crate) fn peers_iter(&self) -> impl Iterator<Item = &PeerState> {
        self.peer_state.values()
    }

    /// After the sync phase our log may have grown. Start every peer right after it.
    pub(crate) fn restart_all_peers_after(&mut self, latest_sequence: Option<Sequence>) {
        for peer_state in self.peer_state.values_mut() {
            peer_state.restart_after(latest_sequence);
        }
    }
}

pub(crate) struct PeerState {
    // Held to send heartbeats for this peer
    heartbeat_timer_handle: HeartbeatTimerHandle,

    // Sequence of the next log entry to send to that peer. Starts right after our latest entry
    // and walks backwards until the peer's log matches ours.
    next: Sequence,
    // Sequence of highest log entry known to be replicated on the peer. Only increases. Once
    // set, `next` stays at `matched + 1`.
    matched: Option<Sequence>,

    // SeqNo is a logical clock for one primary's calls to one peer. Each request takes the next
    // number and its reply carries it back; replies older than the newest one seen are dropped.
    last_sent_seq_no: u64,
    last_received_seq_no: u64,
}

impl PeerState {
    pub(super) fn new(heartbeat_timer_handle: HeartbeatTimerHandle, latest_sequence: Option<Sequence>) -> Self {
        PeerState {
            heartbeat_timer_handle,
            next: Self::after(latest_sequence),
            matched: None,
            last_sent_seq_no: 0,
            last_received_seq_no: 0,
        }
    }

    fn after(sequence: Option<Sequence>) -> Sequence {
        sequence.map(|s| s.plus(1)).unwrap_or_else(Sequence::start)
    }

    fn restart_after(&mut self, latest_sequence: Option<Sequence>) {
        self.next = Self::after(latest_sequence);
        self.matched = None;
    }

    pub(crate) fn next_and_previous_sequence(&self) -> (Sequence, Option<Sequence>) {
        (self.next, self.next.checked_minus(1))
    }

    pub(crate) fn matched(&self) -> Option<Sequence> {
        self.matched
    }

    pub(crate) fn handle_append_entries_result(
        &mut self,
        logger: &slog::Logger,
        received_seq_no: u64,
        update: PeerStateUpdate,
    ) {
        if !self.ratchet_fwd_received_seq_no(received_seq_no) {
            slog::warn!(
                logger,
                "Dropping out of date seq-no({:?}): {:?}",
                received_seq_no,
                update
            );
            return;
        }

        match update {
            PeerStateUpdate::OtherError => { /* No action */ }
            PeerStateUpdate::Success {
                previous_sequence,
                num_entries_replicated,
            } => {
                self.update_log(previous_sequence, num_entries_replicated);
            }
            PeerStateUpdate::PeerLogBehind { peer_latest } => {
                self.rewind_log(logger, peer_latest);
            }
        }
    }

    fn update_log(&mut self, previous_sequence: Option<Sequence>, num_entries_replicated: usize) {
        let new_matched = match (previous_sequence, num_entries_replicated) {
            // Heartbeat, or nothing new to send.
            (_, 0) => return,
            (None, n) => Sequence::new_usize(n),
            (Some(prev), n) => prev.plus(n as u64),
        };
        let new_next = new_matched.plus(1);

        // Panic here, because it means as primary, we either sent something wrong or are tracking
        // state wrong.
        assert!(
            new_next > self.next,
            "Next can only ratchet forward. CurrentNext={:?}, NewNext={:?}",
            self.next,
            new_next
        );
        if let Some(matched) = self.matched {
            assert!(
                new_matched > matched,
                "Matched can only ratchet forward. CurrentMatched={:?}, NewMatched={:?}",
                matched,
                new_matched
            )
        }

        self.next = new_next;
        self.matched.replace(new_matched);
    }

    fn rewind_log(&mut self, logger: &slog::Logger, peer_latest: Option<Sequence>) {
        // Don't panic here, because peer could return garbage data.
        if self.matched.is_some() {
            slog::warn!(
                logger,
                "Illegal state: Can't handle AppendEntries rewind error after any success. Not mutating state."
            );
            return;
        }

        let stepped_back = match self.next.checked_minus(1) {
            Some(stepped_back) => stepped_back,
            None => {
                slog::warn!(logger, "Can't rewind peer log, already at beginning of log.");
                return;
            }
        };
        // Skip straight past the end of a short peer log instead of walking back one at a time.
        self.next = cmp::min(stepped_back, Self::after(peer_latest));
    }

    pub(crate) fn has_outstanding_request(&self) -> bool {
        self.last_received_seq_no < self.last_sent_seq_no
    }

    pub(crate) fn next_seq_no(&mut self) -> u64 {
        self.last_sent_seq_no += 1;
        self.last_sent_seq_no
    }

    /// returns true if the state was mutated.
    fn ratchet_fwd_received_seq_no(&mut self, received_seq_no: u64) -> bool {
        if self.last_received_seq_no < received_seq_no && received_seq_no <= self.last_sent_seq_no {
            self.last_received_seq_no = received_seq_no;
            true
        } else {
            false
        }
    }

    pub(crate) fn reset_heartbeat_timer(&self) {
        self.heartbeat_timer_handle.reset_heartbeat_timer();
    }
}

#[derive(Debug)]
pub(crate) enum PeerStateUpdate {
    Success {
        previous_sequence: Option<Sequence>,
        num_entries_replicated: usize,
    },
    PeerLogBehind {
        peer_latest: Option<Sequence>,
    },
    OtherError,
}

pub(crate) type ProposeCallback = Callback<ProposeOutput, ProposeError>;

/// State of a freshly elected primary's sync phase. No proposal is appended until it ends.
pub(crate) struct SyncPhase {
    awaiting: HashSet<ReplicaId>,
    replies: Vec<(ReplicaId, RequestSyncOutput)>,
    deferred: Vec<(ProposeInput, ProposeCallback)>,
}

impl SyncPhase {
    pub(super) fn new(peer_ids: HashSet<ReplicaId>) -> Self {
        SyncPhase {
            awaiting: peer_ids,
            replies: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Returns true once no peer is outstanding.
    pub(crate) fn record_reply(&mut self, peer_id: ReplicaId, reply: Option<RequestSyncOutput>) -> bool {
        if self.awaiting.remove(&peer_id) {
            if let Some(reply) = reply {
                self.replies.push((peer_id, reply));
            }
        }
        self.is_complete()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.awaiting.is_empty()
    }

    pub(crate) fn num_replies(&self) -> usize {
        self.replies.len()
    }

    pub(crate) fn defer(&mut self, input: ProposeInput, callback: ProposeCallback) {
        self.deferred.push((input, callback));
    }

    pub(crate) fn into_parts(self) -> (Vec<(ReplicaId, RequestSyncOutput)>, Vec<(ProposeInput, ProposeCallback)>) {
        (self.replies, self.deferred)
    }
}
