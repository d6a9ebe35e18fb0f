use crate::commitlog;
use crate::replica::Epoch;
use crate::store::Operation;
use bytes::{Buf, BufMut};
use chrono::{DateTime, TimeZone, Utc};
use std::convert::TryFrom;
use std::io;

/// Byte representation:
///
/// ```text
/// |                                         1                   2                   |
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | ... |
/// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-...-+
/// |Vrs|       Epoch (8 bytes)         |     Timestamp (8 bytes)       | Op  ... |
/// +---+-------------------------------+-------------------------------+-----...-+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Epoch` - epoch of the primary that created this entry
/// * `Timestamp` - millis since unix epoch, as seen by that primary
/// * `Op` - JSON encoded `Operation`
///
/// Integers are big-endian. Checksum and length are the underlying commitlog's job.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LogEntry {
    pub(crate) epoch: Epoch,
    pub(crate) origin_timestamp: DateTime<Utc>,
    pub(crate) operation: Operation,
}

const LOG_ENTRY_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 8;

impl LogEntry {
    pub(crate) fn new(epoch: Epoch, operation: Operation) -> Self {
        LogEntry {
            epoch,
            origin_timestamp: Utc::now(),
            operation,
        }
    }
}

impl commitlog::Entry for LogEntry {}

impl TryFrom<Vec<u8>> for LogEntry {
    type Error = io::Error;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() < HEADER_LEN {
            return Err(invalid_data(format!("log entry too short: {} bytes", bytes.len())));
        }

        let mut header = &bytes[..HEADER_LEN];
        let version = header.get_u8();
        if version != LOG_ENTRY_FORMAT_VERSION {
            return Err(invalid_data(format!("unknown log entry version {}", version)));
        }
        let epoch = Epoch::new(header.get_u64());
        let millis = header.get_i64();

        let origin_timestamp = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| invalid_data(format!("bad timestamp {}", millis)))?;
        let operation = serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| invalid_data(e.to_string()))?;

        Ok(LogEntry {
            epoch,
            origin_timestamp,
            operation,
        })
    }
}

impl From<LogEntry> for Vec<u8> {
    fn from(entry: LogEntry) -> Self {
        // Serializing a plain enum of strings and integers can't fail.
        let op = serde_json::to_vec(&entry.operation).unwrap_or_default();

        let mut bytes = Vec::with_capacity(HEADER_LEN + op.len());
        bytes.put_u8(LOG_ENTRY_FORMAT_VERSION);
        bytes.put_u64(entry.epoch.as_u64());
        bytes.put_i64(entry.origin_timestamp.timestamp_millis());
        bytes.put_slice(&op);

        bytes
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
