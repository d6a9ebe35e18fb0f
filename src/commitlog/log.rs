use std::convert::TryFrom;
use std::marker::PhantomData;
use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Sequence is the position of an entry in the log; i.e. a log entry's sequence number.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Sequence(U64NonZero);

impl Sequence {
    pub fn new(sequence: u64) -> Self {
        Sequence(U64NonZero::new(sequence))
    }

    pub fn new_usize(sequence: usize) -> Self {
        Self::new(sequence as u64)
    }

    /// Wire and disk formats use 0 for "no entry".
    pub fn from_u64_opt(sequence: u64) -> Option<Self> {
        match sequence {
            0 => None,
            s => Some(Self::new(s)),
        }
    }

    pub fn start() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub fn plus(&self, delta: u64) -> Sequence {
        Sequence::new(self.as_u64() + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Sequence> {
        self.as_u64().checked_sub(delta).and_then(Self::from_u64_opt)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// Log is an append only, durable log. It is the source of truth for everything a chat server
/// knows; all other state is rebuilt from it.
///
/// Log numbers entries starting from 1. There will be no entry existing at sequence 0. The first
/// entry is written at sequence 1.
pub trait Log<E: Entry> {
    /// append() appends a log entry at the next sequence, then returns the sequence that was just
    /// used. The entry must be on stable storage before this returns.
    fn append(&mut self, entry: E) -> Result<Sequence, io::Error>;

    /// Read log entry at specified sequence.
    fn read(&self, sequence: Sequence) -> Result<Option<E>, io::Error>;

    /// Removes anything starting at `sequence` and later.
    fn truncate(&mut self, sequence: Sequence) -> Result<(), io::Error>;

    /// next_sequence returns the next sequence that will be used to append an entry.
    fn next_sequence(&self) -> Sequence;

    fn latest_sequence(&self) -> Option<Sequence> {
        self.next_sequence().checked_minus(1)
    }

    /// Lazily iterates from `sequence` to the current end of the log. Calling it again restarts
    /// from wherever the caller asks.
    fn read_from(&self, sequence: Sequence) -> ReadFrom<'_, E, Self>
    where
        Self: Sized,
    {
        ReadFrom {
            log: self,
            next: sequence,
            done: false,
            _pd: PhantomData,
        }
    }
}

pub trait Entry: Clone + TryFrom<Vec<u8>, Error = io::Error> + Into<Vec<u8>> {}

pub struct ReadFrom<'a, E, L> {
    log: &'a L,
    next: Sequence,
    done: bool,
    _pd: PhantomData<E>,
}

impl<'a, E, L> Iterator for ReadFrom<'a, E, L>
where
    E: Entry,
    L: Log<E>,
{
    type Item = Result<(Sequence, E), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.log.read(self.next) {
            Ok(Some(entry)) => {
                let sequence = self.next;
                self.next = sequence.plus(1);
                Some(Ok((sequence, entry)))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_arithmetic() {
        let s = Sequence::start();
        assert_eq!(s.as_u64(), 1);
        assert_eq!(s.plus(4).as_u64(), 5);
        assert_eq!(s.checked_minus(1), None);
        assert_eq!(s.plus(4).checked_minus(2), Some(Sequence::new(3)));
        assert_eq!(Sequence::from_u64_opt(0), None);
        assert_eq!(Sequence::from_u64_opt(7), Some(Sequence::new(7)));
    }

    #[test]
    #[should_panic]
    fn sequence_zero_is_illegal() {
        Sequence::new(0);
    }
}
