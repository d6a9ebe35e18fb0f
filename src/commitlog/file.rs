use crate::commitlog::{Entry, Log, Sequence};
use bytes::{Buf, BufMut, BytesMut};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

// Each record on disk:
//
// ```text
// +----------------+----------------+--------------------------+
// | Len (4 bytes)  | CRC32 (4 bytes)| Payload (Len bytes)  ... |
// +----------------+----------------+--------------------------+
// ```
//
// Integers are big-endian. CRC32 covers the payload only.
const RECORD_HEADER_LEN: usize = 8;

/// FileLog is a single-file durable log. Every append is fsync'd before it returns. Payloads are
/// mirrored in memory so reads never touch disk.
pub struct FileLog<E: Entry> {
    logger: slog::Logger,
    path: PathBuf,
    file: File,
    // offsets[i] is where the record for sequence i+1 starts.
    offsets: Vec<u64>,
    end_offset: u64,
    records: Vec<Vec<u8>>,
    _pd: PhantomData<E>,
}

impl<E: Entry> FileLog<E> {
    /// Opens (or creates) the log at `path`. A torn or corrupt tail is cut off at the first bad
    /// record; everything before it is kept.
    pub fn open<P: AsRef<Path>>(logger: slog::Logger, path: P) -> Result<Self, io::Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;

        let (offsets, records, valid_len) = Self::scan(&contents);
        if valid_len < contents.len() {
            slog::warn!(
                logger,
                "Log {:?} has a corrupt tail. Truncating {} bytes after record {}.",
                path,
                contents.len() - valid_len,
                records.len(),
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }
        slog::info!(logger, "Opened log {:?} with {} records", path, records.len());

        Ok(FileLog {
            logger,
            path,
            file,
            offsets,
            end_offset: valid_len as u64,
            records,
            _pd: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scan(contents: &[u8]) -> (Vec<u64>, Vec<Vec<u8>>, usize) {
        let mut offsets = Vec::new();
        let mut records = Vec::new();
        let mut cursor = contents;
        let mut position = 0usize;

        while cursor.len() >= RECORD_HEADER_LEN {
            let mut header = &cursor[..RECORD_HEADER_LEN];
            let len = header.get_u32() as usize;
            let crc = header.get_u32();

            let record_len = RECORD_HEADER_LEN + len;
            if cursor.len() < record_len {
                break;
            }
            let payload = &cursor[RECORD_HEADER_LEN..record_len];
            if crc32fast::hash(payload) != crc {
                break;
            }

            offsets.push(position as u64);
            records.push(payload.to_vec());
            position += record_len;
            cursor = &cursor[record_len..];
        }

        (offsets, records, position)
    }

    fn vec_index(sequence: Sequence) -> usize {
        (sequence.as_u64() - 1) as usize
    }

    fn write_record(&mut self, payload: &[u8]) -> Result<(), io::Error> {
        let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.put_u32(crc32fast::hash(payload));
        buf.put_slice(payload);

        self.file.seek(SeekFrom::Start(self.end_offset))?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

impl<E: Entry> Log<E> for FileLog<E> {
    fn append(&mut self, entry: E) -> Result<Sequence, io::Error> {
        let payload: Vec<u8> = entry.into();
        if payload.len() > u32::MAX as usize {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "log record too large"));
        }

        if let Err(e) = self.write_record(&payload) {
            // Best effort to not leave a torn record behind. Reopening would cut it off anyway.
            let _ = self.file.set_len(self.end_offset);
            return Err(e);
        }

        self.offsets.push(self.end_offset);
        self.end_offset += (RECORD_HEADER_LEN + payload.len()) as u64;
        self.records.push(payload);

        Ok(Sequence::new_usize(self.records.len()))
    }

    fn read(&self, sequence: Sequence) -> Result<Option<E>, io::Error> {
        match self.records.get(Self::vec_index(sequence)) {
            Some(bytes) => E::try_from(bytes.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn truncate(&mut self, sequence: Sequence) -> Result<(), io::Error> {
        let index = Self::vec_index(sequence);
        let new_end = match self.offsets.get(index) {
            Some(offset) => *offset,
            None => return Ok(()),
        };

        slog::info!(
            self.logger,
            "Truncating log {:?} from sequence {:?} ({} records dropped)",
            self.path,
            sequence,
            self.records.len() - index,
        );
        self.file.set_len(new_end)?;
        self.file.sync_all()?;

        self.offsets.truncate(index);
        self.records.truncate(index);
        self.end_offset = new_end;
        Ok(())
    }

    fn next_sequence(&self) -> Sequence {
        Sequence::new_usize(self.records.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::in_memory::tests::TestEntry;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
            for i in 1..=3u8 {
                log.append(TestEntry(vec![i; i as usize])).unwrap();
            }
        }

        let log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
        assert_eq!(log.latest_sequence(), Some(Sequence::new(3)));
        assert_eq!(log.read(Sequence::new(2)).unwrap(), Some(TestEntry(vec![2, 2])));
    }

    #[test]
    fn truncate_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
            for i in 1..=5u8 {
                log.append(TestEntry(vec![i])).unwrap();
            }
            log.truncate(Sequence::new(3)).unwrap();
            // Appending after a truncate reuses the freed sequence.
            assert_eq!(log.append(TestEntry(vec![9])).unwrap(), Sequence::new(3));
        }

        let log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
        assert_eq!(log.latest_sequence(), Some(Sequence::new(3)));
        assert_eq!(log.read(Sequence::new(3)).unwrap(), Some(TestEntry(vec![9])));
    }

    #[test]
    fn corrupt_tail_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
            log.append(TestEntry(b"first".to_vec())).unwrap();
            log.append(TestEntry(b"second".to_vec())).unwrap();
        }

        // Flip a payload byte of the second record, then add a torn half-header.
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        bytes.extend_from_slice(&[0, 0, 0]);
        fs::write(&path, &bytes).unwrap();

        let mut log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
        assert_eq!(log.latest_sequence(), Some(Sequence::start()));
        assert_eq!(log.read(Sequence::start()).unwrap(), Some(TestEntry(b"first".to_vec())));

        assert_eq!(log.append(TestEntry(b"third".to_vec())).unwrap(), Sequence::new(2));
        drop(log);
        let log: FileLog<TestEntry> = FileLog::open(logger(), &path).unwrap();
        assert_eq!(log.read(Sequence::new(2)).unwrap(), Some(TestEntry(b"third".to_vec())));
    }
}
