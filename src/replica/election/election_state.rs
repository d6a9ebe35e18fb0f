use crate::actor::WeakActorClient;
use crate::commitlog::Sequence;
use crate::replica::election::primary_state::SyncPhase;
use crate::replica::election::state_change_listener::ElectionStateChangeNotifier;
use crate::replica::election::timers::{ElectionTimerHandle, HeartbeatTimerHandle};
use crate::replica::election::{state_change_listener, PeerState, PrimaryStateTracker};
use crate::replica::{ElectionStateChangeListener, ElectionStateSnapshot, Epoch, PrimaryHint, ReplicaId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct ElectionConfig {
    pub my_replica_id: ReplicaId,
    pub heartbeat_interval: Duration,
    pub election_min_timeout: Duration,
    pub election_max_timeout: Duration,
}

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, epochs, peers, etc. or knowing "when" to do something.
pub(crate) struct ElectionState {
    state: State,
    config: ElectionConfig,
    actor_client: WeakActorClient,
    state_change_notifier: ElectionStateChangeNotifier,
}

impl ElectionState {
    /// Every replica starts out as a backup that doesn't know the primary.
    pub(crate) fn new_backup(config: ElectionConfig, actor_client: WeakActorClient) -> (Self, ElectionStateChangeListener) {
        let initial_state = State::Backup(BackupState::new(None, &config, actor_client.clone()));
        let (notifier, listener) = state_change_listener::new(Self::current_state_impl(&initial_state));

        let election_state = Self {
            state: initial_state,
            config,
            actor_client,
            state_change_notifier: notifier,
        };

        (election_state, listener)
    }

    /// Returns the sync phase we were still in, if any, so its deferred proposals can be failed.
    pub(crate) fn transition_to_backup(&mut self, primary: Option<PrimaryHint>) -> Option<SyncPhase> {
        let new_state = State::Backup(BackupState::new(primary, &self.config, self.actor_client.clone()));
        let old_state = std::mem::replace(&mut self.state, new_state);
        self.notify_new_state();

        match old_state {
            State::Primary(ps) => ps.sync,
            _ => None,
        }
    }

    pub(crate) fn transition_to_candidate_and_vote_for_self(&mut self) {
        let mut cs = CandidateState::new(&self.config, self.actor_client.clone());

        // Vote for self
        cs.add_received_vote(self.config.my_replica_id.clone());

        self.state = State::Candidate(cs);
        self.notify_new_state();
    }

    /// Becomes primary in the sync phase.
    pub(crate) fn transition_to_primary(
        &mut self,
        epoch: Epoch,
        peer_ids: HashSet<ReplicaId>,
        latest_sequence: Option<Sequence>,
    ) {
        self.state = State::Primary(PrimaryState::new(
            peer_ids,
            latest_sequence,
            self.config.heartbeat_interval,
            self.actor_client.clone(),
            epoch,
        ));
        self.notify_new_state();
    }

    /// Ends the sync phase and hands back what it collected. None if not primary, or already done.
    pub(crate) fn finish_sync(&mut self) -> Option<SyncPhase> {
        let sync = match &mut self.state {
            State::Primary(ps) => ps.sync.take(),
            _ => None,
        };
        if sync.is_some() {
            self.notify_new_state();
        }
        sync
    }

    pub(crate) fn sync_phase_mut(&mut self) -> Option<&mut SyncPhase> {
        match &mut self.state {
            State::Primary(PrimaryState { sync: Some(sync), .. }) => Some(sync),
            _ => None,
        }
    }

    pub(crate) fn current_state(&self) -> ElectionStateSnapshot {
        Self::current_state_impl(&self.state)
    }

    fn current_state_impl(state: &State) -> ElectionStateSnapshot {
        match state {
            State::Primary(PrimaryState { sync: Some(_), .. }) => ElectionStateSnapshot::PrimarySyncing,
            State::Primary(PrimaryState { sync: None, .. }) => ElectionStateSnapshot::Primary,
            State::Candidate(_) => ElectionStateSnapshot::Candidate,
            State::Backup(BackupState { primary: None, .. }) => ElectionStateSnapshot::BackupNoPrimary,
            State::Backup(BackupState {
                primary: Some(primary), ..
            }) => ElectionStateSnapshot::Backup(primary.clone()),
        }
    }

    fn notify_new_state(&self) {
        self.state_change_notifier
            .notify_new_state(Self::current_state_impl(&self.state));
    }

    pub(crate) fn is_primary(&self) -> bool {
        matches!(self.state, State::Primary(_))
    }

    pub(crate) fn is_candidate(&self) -> bool {
        matches!(self.state, State::Candidate(_))
    }

    /// Who clients should go to instead of us, if we know.
    pub(crate) fn primary_hint(&self) -> Option<PrimaryHint> {
        match &self.state {
            State::Backup(bs) => bs.primary.clone(),
            _ => None,
        }
    }

    pub(crate) fn reset_timeout_if_backup(&self) {
        if let State::Backup(bs) = &self.state {
            bs.reset_timeout();
        }
    }

    pub(crate) fn set_primary_if_unknown(&mut self, primary: &PrimaryHint) {
        if let State::Backup(bs) = &mut self.state {
            if bs.primary.is_none() {
                bs.primary.replace(primary.clone());
                self.notify_new_state();
            }
        }
    }

    /// Return number of votes received if candidate, or None if no longer Candidate.
    pub(crate) fn add_vote_if_candidate(&mut self, vote_from: ReplicaId) -> Option<usize> {
        if let State::Candidate(cs) = &mut self.state {
            Some(cs.add_received_vote(vote_from))
        } else {
            None
        }
    }

    pub(crate) fn primary_state_mut(&mut self) -> Option<&mut PrimaryStateTracker> {
        if let State::Primary(ps) = &mut self.state {
            Some(&mut ps.tracker)
        } else {
            None
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Primary(PrimaryState { sync: Some(_), .. }) => write!(f, "Primary(Syncing)"),
            State::Primary(_) => write!(f, "Primary"),
            State::Candidate(_) => write!(f, "Candidate"),
            State::Backup(BackupState {
                primary: Some(primary), ..
            }) => write!(f, "Backup(Primary={:?})", primary.replica_id),
            State::Backup(BackupState { primary: None, .. }) => write!(f, "Backup(Primary=None)"),
        }
    }
}

enum State {
    Primary(PrimaryState),
    Candidate(CandidateState),
    Backup(BackupState),
}

struct PrimaryState {
    tracker: PrimaryStateTracker,
    sync: Option<SyncPhase>,
}

struct CandidateState {
    received_votes_from: HashSet<ReplicaId>,
    _election_timer: ElectionTimerHandle,
}

struct BackupState {
    primary: Option<PrimaryHint>,
    election_timer: ElectionTimerHandle,
}

impl PrimaryState {
    fn new(
        peer_ids: HashSet<ReplicaId>,
        latest_sequence: Option<Sequence>,
        heartbeat_interval: Duration,
        actor_client: WeakActorClient,
        epoch: Epoch,
    ) -> Self {
        let mut peer_state = HashMap::with_capacity(peer_ids.len());
        for peer_id in peer_ids.iter() {
            let heartbeat_timer =
                HeartbeatTimerHandle::spawn_timer_task(heartbeat_interval, actor_client.clone(), peer_id.clone(), epoch);
            peer_state.insert(peer_id.clone(), PeerState::new(heartbeat_timer, latest_sequence));
        }

        Self {
            tracker: PrimaryStateTracker::new(peer_state),
            sync: Some(SyncPhase::new(peer_ids)),
        }
    }
}

impl CandidateState {
    fn new(config: &ElectionConfig, actor_client: WeakActorClient) -> Self {
        Self {
            received_votes_from: HashSet::with_capacity(3),
            // A split vote times out like a silent primary does, and we run again.
            _election_timer: ElectionTimerHandle::spawn_timer_task(
                config.election_min_timeout,
                config.election_max_timeout,
                actor_client,
            ),
        }
    }

    /// `add_received_vote()` returns the number of unique votes we've received after adding the
    /// provided `vote_from`
    fn add_received_vote(&mut self, vote_from: ReplicaId) -> usize {
        self.received_votes_from.insert(vote_from);
        self.received_votes_from.len()
    }
}

impl BackupState {
    fn new(primary: Option<PrimaryHint>, config: &ElectionConfig, actor_client: WeakActorClient) -> Self {
        Self {
            primary,
            election_timer: ElectionTimerHandle::spawn_timer_task(
                config.election_min_timeout,
                config.election_max_timeout,
                actor_client,
            ),
        }
    }

    fn reset_timeout(&self) {
        self.election_timer.reset_timeout();
    }
}
