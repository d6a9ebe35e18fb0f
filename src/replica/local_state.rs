use crate::commitlog::Sequence;
use crate::replica::peers::ReplicaId;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::fmt;

/// Epoch identifies one primary's tenure. 0 means no election has happened yet.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn new(epoch: u64) -> Self {
        Epoch(epoch)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PersistentLocalState is used whenever replication safety requires that something is persisted
/// to a durable store before we act on it: the current epoch, who we voted for in it, and how far
/// the log is known to be committed.
///
/// Store methods should be implemented atomically via a CAS like operation. Similar to most CAS
/// method signatures, the CAS store methods will return true if we have mutated state.
pub(crate) trait PersistentLocalState {
    /// Set current epoch to `new_epoch` atomically, iff it is larger than current epoch. Clears
    /// the vote.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_epoch_if_increased(&mut self, new_epoch: Epoch) -> Result<bool, io::Error>;

    /// Store our vote for the latest epoch iff the latest epoch (internal state) is the same epoch
    /// as the one provided, and we have not stored a vote for the latest epoch.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_vote_for_epoch_if_unvoted(&mut self, expected_epoch: Epoch, vote: ReplicaId) -> Result<bool, io::Error>;

    /// Return the new epoch. Used when transitioning to candidate.
    fn increment_epoch_and_vote_for_self(&mut self) -> Result<Epoch, io::Error>;

    /// Only moves forward.
    fn store_commit_sequence(&mut self, commit: Sequence) -> Result<(), io::Error>;

    fn current_epoch(&self) -> Epoch;
    fn voted_for_current_epoch(&self) -> (Epoch, Option<Arc<ReplicaId>>);
    fn commit_sequence(&self) -> Option<Sequence>;
}

#[derive(Clone)]
struct LocalStateData {
    current_epoch: Epoch,
    voted_for_this_epoch: Option<Arc<ReplicaId>>,
    commit_sequence: Option<Sequence>,
}

impl LocalStateData {
    fn store_epoch_if_increased(&mut self, new_epoch: Epoch) -> bool {
        if new_epoch <= self.current_epoch {
            false
        } else {
            self.current_epoch = new_epoch;
            self.voted_for_this_epoch = None;
            true
        }
    }

    fn store_vote_for_epoch_if_unvoted(&mut self, expected_epoch: Epoch, vote: ReplicaId) -> bool {
        if expected_epoch == self.current_epoch && self.voted_for_this_epoch.is_none() {
            self.voted_for_this_epoch.replace(Arc::new(vote));
            true
        } else {
            false
        }
    }

    fn increment_epoch_and_vote_for_self(&mut self, my_replica_id: &Arc<ReplicaId>) -> Epoch {
        self.current_epoch.incr();
        self.voted_for_this_epoch.replace(my_replica_id.clone());
        self.current_epoch
    }

    fn store_commit_sequence(&mut self, commit: Sequence) -> bool {
        if matches!(self.commit_sequence, Some(current) if current >= commit) {
            return false;
        }
        self.commit_sequence.replace(commit);
        true
    }
}

/// Volatile local state, for tests.
pub(crate) struct VolatileLocalState {
    data: LocalStateData,
    my_replica_id: Arc<ReplicaId>,
}

impl VolatileLocalState {
    pub(crate) fn new(my_replica_id: ReplicaId) -> Self {
        VolatileLocalState {
            data: LocalStateData {
                current_epoch: Epoch::new(0),
                voted_for_this_epoch: None,
                commit_sequence: None,
            },
            my_replica_id: Arc::new(my_replica_id),
        }
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn store_epoch_if_increased(&mut self, new_epoch: Epoch) -> Result<bool, io::Error> {
        Ok(self.data.store_epoch_if_increased(new_epoch))
    }

    fn store_vote_for_epoch_if_unvoted(&mut self, expected_epoch: Epoch, vote: ReplicaId) -> Result<bool, io::Error> {
        Ok(self.data.store_vote_for_epoch_if_unvoted(expected_epoch, vote))
    }

    fn increment_epoch_and_vote_for_self(&mut self) -> Result<Epoch, io::Error> {
        Ok(self.data.increment_epoch_and_vote_for_self(&self.my_replica_id))
    }

    fn store_commit_sequence(&mut self, commit: Sequence) -> Result<(), io::Error> {
        self.data.store_commit_sequence(commit);
        Ok(())
    }

    fn current_epoch(&self) -> Epoch {
        self.data.current_epoch
    }

    fn voted_for_current_epoch(&self) -> (Epoch, Option<Arc<ReplicaId>>) {
        (self.data.current_epoch, self.data.voted_for_this_epoch.clone())
    }

    fn commit_sequence(&self) -> Option<Sequence> {
        self.data.commit_sequence
    }
}

/// On-disk form of the local state.
#[derive(Serialize, Deserialize, Debug, Default)]
struct LocalStateFile {
    epoch: u64,
    voted_for: Option<String>,
    commit_sequence: u64,
}

/// FileLocalState keeps local state in a small JSON file. Every mutation rewrites the whole file
/// via write-to-temp, fsync, rename, so a crash leaves either the old or the new version.
pub(crate) struct FileLocalState {
    path: PathBuf,
    data: LocalStateData,
    my_replica_id: Arc<ReplicaId>,
}

impl FileLocalState {
    pub(crate) fn open<P: AsRef<Path>>(path: P, my_replica_id: ReplicaId) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();
        let on_disk = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<LocalStateFile>(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => LocalStateFile::default(),
            Err(e) => return Err(e),
        };

        Ok(FileLocalState {
            path,
            data: LocalStateData {
                current_epoch: Epoch::new(on_disk.epoch),
                voted_for_this_epoch: on_disk.voted_for.map(|id| Arc::new(ReplicaId::new(id))),
                commit_sequence: Sequence::from_u64_opt(on_disk.commit_sequence),
            },
            my_replica_id: Arc::new(my_replica_id),
        })
    }

    /// Applies `mutation` to a copy, persists the copy, then swaps it in. Memory never gets ahead
    /// of disk.
    fn persist_if<T, F>(&mut self, mutation: F) -> Result<T, io::Error>
    where
        F: FnOnce(&mut LocalStateData) -> (bool, T),
    {
        let mut next = self.data.clone();
        let (changed, output) = mutation(&mut next);
        if changed {
            self.write_file(&next)?;
            self.data = next;
        }
        Ok(output)
    }

    fn write_file(&self, data: &LocalStateData) -> Result<(), io::Error> {
        let on_disk = LocalStateFile {
            epoch: data.current_epoch.as_u64(),
            voted_for: data.voted_for_this_epoch.as_ref().map(|id| id.as_str().to_string()),
            commit_sequence: data.commit_sequence.map(|s| s.as_u64()).unwrap_or(0),
        };
        let bytes = serde_json::to_vec(&on_disk).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
    }
}

impl PersistentLocalState for FileLocalState {
    fn store_epoch_if_increased(&mut self, new_epoch: Epoch) -> Result<bool, io::Error> {
        self.persist_if(|data| {
            let changed = data.store_epoch_if_increased(new_epoch);
            (changed, changed)
        })
    }

    fn store_vote_for_epoch_if_unvoted(&mut self, expected_epoch: Epoch, vote: ReplicaId) -> Result<bool, io::Error> {
        self.persist_if(|data| {
            let changed = data.store_vote_for_epoch_if_unvoted(expected_epoch, vote);
            (changed, changed)
        })
    }

    fn increment_epoch_and_vote_for_self(&mut self) -> Result<Epoch, io::Error> {
        let me = self.my_replica_id.clone();
        self.persist_if(|data| (true, data.increment_epoch_and_vote_for_self(&me)))
    }

    fn store_commit_sequence(&mut self, commit: Sequence) -> Result<(), io::Error> {
        self.persist_if(|data| (data.store_commit_sequence(commit), ()))
    }

    fn current_epoch(&self) -> Epoch {
        self.data.current_epoch
    }

    fn voted_for_current_epoch(&self) -> (Epoch, Option<Arc<ReplicaId>>) {
        (self.data.current_epoch, self.data.voted_for_this_epoch.clone())
    }

    fn commit_sequence(&self) -> Option<Sequence> {
        self.data.commit_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_vote_per_epoch() {
        let mut state = VolatileLocalState::new(ReplicaId::new("node-1"));
        assert!(state.store_epoch_if_increased(Epoch::new(3)).unwrap());
        assert!(!state.store_epoch_if_increased(Epoch::new(3)).unwrap());

        assert!(state
            .store_vote_for_epoch_if_unvoted(Epoch::new(3), ReplicaId::new("node-2"))
            .unwrap());
        assert!(!state
            .store_vote_for_epoch_if_unvoted(Epoch::new(3), ReplicaId::new("node-3"))
            .unwrap());
        assert!(!state
            .store_vote_for_epoch_if_unvoted(Epoch::new(2), ReplicaId::new("node-3"))
            .unwrap());

        // New epoch, new vote.
        assert_eq!(state.increment_epoch_and_vote_for_self().unwrap(), Epoch::new(4));
        let (epoch, voted_for) = state.voted_for_current_epoch();
        assert_eq!(epoch, Epoch::new(4));
        assert_eq!(voted_for.as_deref(), Some(&ReplicaId::new("node-1")));
    }

    #[test]
    fn file_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica-state.json");

        {
            let mut state = FileLocalState::open(&path, ReplicaId::new("node-1")).unwrap();
            assert_eq!(state.current_epoch(), Epoch::new(0));
            assert_eq!(state.commit_sequence(), None);

            state.store_epoch_if_increased(Epoch::new(7)).unwrap();
            state
                .store_vote_for_epoch_if_unvoted(Epoch::new(7), ReplicaId::new("node-2"))
                .unwrap();
            state.store_commit_sequence(Sequence::new(12)).unwrap();
            // Never backwards.
            state.store_commit_sequence(Sequence::new(4)).unwrap();
        }

        let state = FileLocalState::open(&path, ReplicaId::new("node-1")).unwrap();
        assert_eq!(state.current_epoch(), Epoch::new(7));
        assert_eq!(state.voted_for_current_epoch().1.as_deref(), Some(&ReplicaId::new("node-2")));
        assert_eq!(state.commit_sequence(), Some(Sequence::new(12)));
    }
}
