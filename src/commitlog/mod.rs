//! Generic append-only log, independent of what the entries mean.
mod file;
mod in_memory;
mod log;

pub use file::FileLog;
pub use in_memory::InMemoryLog;
pub use log::Entry;
pub use log::Log;
pub use log::ReadFrom;
pub use log::Sequence;
