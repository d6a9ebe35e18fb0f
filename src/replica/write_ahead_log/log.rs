use crate::commitlog::{Log, Sequence};
use crate::replica::write_ahead_log::LogEntry;
use crate::replica::Epoch;
use crate::store::{ApplyOutcome, StateStore};
use std::io;

/// DurableLog is the replication-specific facade over the generic commit log. It also owns the
/// hand-off of committed entries to the state store.
///
/// Note: A log entry has 3 states (not modeled directly in code):
/// 1. Persisted - written to disk, not yet replicated to a quorum
/// 2. Committed - written to disk, replicated to a quorum
/// 3. Applied - a committed entry that has also been applied to the state store
///
/// A log entry's state has no global truth. Each replica has its own local view of what state the
/// log entry is in.
pub(crate) struct DurableLog<L>
where
    L: Log<LogEntry>,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    // Metadata about the highest log entry that we've locally written.
    latest_entry_metadata: Option<(Epoch, Sequence)>,

    // Sequence of highest log entry known to be committed. None if nothing is committed.
    commit_sequence: Option<Sequence>,
    // Applied entries end up here. Its `last_applied()` is our applied watermark.
    store: StateStore,
}

impl<L> DurableLog<L>
where
    L: Log<LogEntry>,
{
    /// Wraps an existing (possibly non-empty) log and replays everything up to
    /// `persisted_commit` into `store`.
    pub(crate) fn new(
        logger: slog::Logger,
        log: L,
        store: StateStore,
        persisted_commit: Option<Sequence>,
    ) -> Result<Self, io::Error> {
        let latest_entry_metadata = match log.latest_sequence() {
            Some(latest) => {
                let entry = log
                    .read(latest)?
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "latest log entry is missing"))?;
                Some((entry.epoch, latest))
            }
            None => None,
        };

        // A commit marker past the end of the log means the log lost its tail. Only trust what
        // we still have.
        let commit_sequence = match (persisted_commit, latest_entry_metadata) {
            (Some(commit), Some((_, latest))) => Some(std::cmp::min(commit, latest)),
            _ => None,
        };
        if commit_sequence != persisted_commit {
            slog::warn!(
                logger,
                "Persisted commit {:?} is beyond the end of the log {:?}",
                persisted_commit,
                latest_entry_metadata.map(|(_, s)| s),
            );
        }

        let mut durable_log = DurableLog {
            logger,
            log,
            latest_entry_metadata,
            commit_sequence,
            store,
        };

        let replayed = durable_log.apply_all_committed_entries()?;
        slog::info!(
            durable_log.logger,
            "Recovered log. latest={:?} commit={:?} replayed={}",
            durable_log.latest_entry_metadata,
            durable_log.commit_sequence,
            replayed.len(),
        );

        Ok(durable_log)
    }

    pub(crate) fn latest_entry(&self) -> Option<(Epoch, Sequence)> {
        self.latest_entry_metadata
    }

    pub(crate) fn store(&self) -> &StateStore {
        &self.store
    }

    pub(crate) fn last_applied(&self) -> Option<Sequence> {
        self.store.last_applied()
    }

    pub(crate) fn read(&self, sequence: Sequence) -> Result<Option<LogEntry>, io::Error> {
        self.log.read(sequence)
    }

    fn read_required(&self, sequence: Sequence) -> Result<LogEntry, io::Error> {
        match self.read(sequence)? {
            Some(entry) => Ok(entry),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no log entry at sequence {:?}", sequence),
            )),
        }
    }

    /// Epoch of the entry at `sequence`, if we have it.
    pub(crate) fn epoch_at(&self, sequence: Sequence) -> Result<Option<Epoch>, io::Error> {
        Ok(self.read(sequence)?.map(|entry| entry.epoch))
    }

    /// Up to `max_entries` entries starting at `sequence`.
    pub(crate) fn read_batch(
        &self,
        sequence: Sequence,
        max_entries: usize,
    ) -> Result<Vec<(Sequence, LogEntry)>, io::Error> {
        self.log.read_from(sequence).take(max_entries).collect()
    }

    /// Remove anything starting at `sequence` and later. Applied entries can never be removed.
    pub(crate) fn truncate(&mut self, sequence: Sequence) -> Result<(), io::Error> {
        if matches!(self.last_applied(), Some(applied) if sequence <= applied) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "refusing to truncate at {:?}; entries through {:?} are applied",
                    sequence,
                    self.last_applied()
                ),
            ));
        }

        let mut new_latest_entry_metadata = None;
        if let Some(new_latest_sequence) = sequence.checked_minus(1) {
            new_latest_entry_metadata = self
                .read(new_latest_sequence)?
                .map(|latest_entry| (latest_entry.epoch, new_latest_sequence));
        }

        self.log.truncate(sequence)?;

        self.latest_entry_metadata = new_latest_entry_metadata;
        if matches!(self.commit_sequence, Some(commit) if commit >= sequence) {
            self.commit_sequence = sequence.checked_minus(1);
        }
        Ok(())
    }

    pub(crate) fn append(&mut self, entry: LogEntry) -> Result<Sequence, io::Error> {
        let appended_epoch = entry.epoch;
        let appended_sequence = self.log.append(entry)?;
        // Only update state after log action completes.
        self.latest_entry_metadata = Some((appended_epoch, appended_sequence));

        Ok(appended_sequence)
    }

    pub(crate) fn commit_sequence(&self) -> Option<Sequence> {
        self.commit_sequence
    }

    /// Primary side. Moves the commit point to `tentative` if it is ahead and the entry there was
    /// written in `current_epoch`; entries from older epochs only commit indirectly, by a later
    /// entry of the current epoch committing.
    ///
    /// Returns true if the commit point moved.
    pub(crate) fn ratchet_fwd_commit_sequence_if_valid(
        &mut self,
        tentative: Sequence,
        current_epoch: Epoch,
    ) -> Result<bool, io::Error> {
        if matches!(self.commit_sequence, Some(current) if tentative <= current) {
            return Ok(false);
        }

        let entry = self.read_required(tentative)?;
        if entry.epoch != current_epoch {
            return Ok(false);
        }

        Ok(self.ratchet_fwd_commit_sequence(tentative))
    }

    /// Backup side. The caller has already bounded `new_commit` by what it verified against the
    /// primary.
    ///
    /// Returns true if the commit point moved.
    pub(crate) fn ratchet_fwd_commit_sequence(&mut self, new_commit: Sequence) -> bool {
        if matches!(self.commit_sequence, Some(current) if new_commit <= current) {
            return false;
        }

        let latest = match self.latest_entry_metadata {
            Some((_, latest)) => latest,
            None => return false,
        };
        let new_commit = std::cmp::min(new_commit, latest);
        if matches!(self.commit_sequence, Some(current) if new_commit <= current) {
            return false;
        }

        self.commit_sequence.replace(new_commit);
        true
    }

    /// Applies all committed but unapplied entries in order. Returns what applying each one did.
    pub(crate) fn apply_all_committed_entries(&mut self) -> Result<Vec<(Sequence, ApplyOutcome)>, io::Error> {
        let commit_sequence = match self.commit_sequence {
            Some(commit) => commit,
            None => return Ok(Vec::new()),
        };

        let mut next = match self.last_applied() {
            Some(applied) => applied.plus(1),
            None => Sequence::start(),
        };

        let mut outcomes = Vec::new();
        while next <= commit_sequence {
            let entry = self.read_required(next)?;
            let outcome = self.store.apply(next, entry.origin_timestamp, &entry.operation);
            if let ApplyOutcome::Rejected(reason) = &outcome {
                slog::debug!(
                    self.logger,
                    "Entry {:?} ({}) was rejected on apply: {}",
                    next,
                    entry.operation.kind(),
                    reason
                );
            }
            outcomes.push((next, outcome));
            next = next.plus(1);
        }

        Ok(outcomes)
    }
}
