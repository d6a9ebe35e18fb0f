//! Replication-specific log on top of the generic commit log.

mod log;
mod log_entry;

pub(crate) use log::DurableLog;
pub(crate) use log_entry::LogEntry;
