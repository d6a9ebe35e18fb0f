use crate::commitlog::{Entry, Log, Sequence};
use std::convert::TryFrom;
use std::io;
use std::marker::PhantomData;

/// Volatile log used by tests and by nodes that don't need to survive a restart.
pub struct InMemoryLog<E: Entry> {
    // We don't *need* to convert these to bytes. We could just hold the original entry in memory,
    // but we want to exercise the conversion logic.
    log: Vec<Vec<u8>>,
    _pd: PhantomData<E>,
}

impl<E: Entry> InMemoryLog<E> {
    pub fn new() -> Self {
        InMemoryLog {
            log: vec![],
            _pd: PhantomData::default(),
        }
    }

    fn vec_index(sequence: Sequence) -> usize {
        // Log API states that Sequence starts from 1.
        (sequence.as_u64() - 1) as usize
    }
}

impl<E: Entry> Log<E> for InMemoryLog<E> {
    fn append(&mut self, entry: E) -> Result<Sequence, io::Error> {
        self.log.push(entry.into());

        Ok(Sequence::new_usize(self.log.len()))
    }

    fn read(&self, sequence: Sequence) -> Result<Option<E>, io::Error> {
        match self.log.get(Self::vec_index(sequence)) {
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, sequence: Sequence) -> Result<(), io::Error> {
        self.log.truncate(Self::vec_index(sequence));
        Ok(())
    }

    fn next_sequence(&self) -> Sequence {
        Sequence::new_usize(self.log.len() + 1)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    pub(crate) struct TestEntry(pub(crate) Vec<u8>);

    impl Entry for TestEntry {}

    impl TryFrom<Vec<u8>> for TestEntry {
        type Error = io::Error;

        fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
            Ok(TestEntry(bytes))
        }
    }

    impl From<TestEntry> for Vec<u8> {
        fn from(entry: TestEntry) -> Self {
            entry.0
        }
    }

    #[test]
    fn append_read_truncate() {
        let mut log = InMemoryLog::new();
        assert_eq!(log.latest_sequence(), None);

        for i in 1..=5u8 {
            let seq = log.append(TestEntry(vec![i])).unwrap();
            assert_eq!(seq, Sequence::new(i as u64));
        }
        assert_eq!(log.read(Sequence::new(3)).unwrap(), Some(TestEntry(vec![3])));
        assert_eq!(log.read(Sequence::new(6)).unwrap(), None);

        log.truncate(Sequence::new(4)).unwrap();
        assert_eq!(log.latest_sequence(), Some(Sequence::new(3)));
        assert_eq!(log.next_sequence(), Sequence::new(4));
        assert_eq!(log.read(Sequence::new(4)).unwrap(), None);
    }

    #[test]
    fn read_from_is_restartable() {
        let mut log = InMemoryLog::new();
        for i in 1..=4u8 {
            log.append(TestEntry(vec![i])).unwrap();
        }

        let tail: Vec<_> = log
            .read_from(Sequence::new(3))
            .map(|r| r.unwrap().1)
            .collect();
        assert_eq!(tail, vec![TestEntry(vec![3]), TestEntry(vec![4])]);

        let all: Vec<_> = log.read_from(Sequence::start()).map(|r| r.unwrap().0).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(log.read_from(Sequence::new(5)).count(), 0);
    }
}
