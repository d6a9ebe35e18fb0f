use crate::wire::EncodeError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No servers configured")]
    NoServers,

    /// Every server was tried `rounds` times without an answer from a primary. Commands that
    /// hadn't been answered stay queued.
    #[error("No server available after {rounds} rounds")]
    NoServerAvailable { rounds: u32 },

    #[error("Server rejected '{cmd}': {reason}")]
    Rejected { cmd: String, reason: String },

    #[error("Command can't be encoded: {0}")]
    Encode(#[from] EncodeError),
}
