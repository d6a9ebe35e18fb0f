//! Chat client that survives primary failover.
mod error;
mod failover_client;
mod options;

pub use error::ClientError;
pub use failover_client::CommandOutcome;
pub use failover_client::FailoverClient;
pub use options::FailoverOptions;
