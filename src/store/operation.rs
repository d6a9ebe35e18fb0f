use crate::store::Message;
use serde::{Deserialize, Serialize};

/// Operation is the state mutation carried by one log entry. Applying the same operation at the
/// same sequence always has the same effect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateAccount {
        username: String,
        password_hash: String,
    },
    DeleteAccount {
        username: String,
    },
    Login {
        username: String,
        session_token: String,
    },
    Logout {
        username: String,
        session_token: String,
    },
    SendMessage {
        message_id: String,
        sender: String,
        recipient: String,
        body: String,
    },
    /// `request_id` ties retries of one destructive read together. A retry gets the batch the
    /// first attempt removed instead of removing another.
    ReadMessages {
        username: String,
        limit: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// First entry of every epoch. Sessions from previous primaries are void once it applies.
    EpochStart {
        primary_id: String,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateAccount { .. } => "create_account",
            Operation::DeleteAccount { .. } => "delete_account",
            Operation::Login { .. } => "login",
            Operation::Logout { .. } => "logout",
            Operation::SendMessage { .. } => "send_message",
            Operation::ReadMessages { .. } => "read_messages",
            Operation::EpochStart { .. } => "epoch_start",
        }
    }
}

/// What applying one entry did to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Sequence was at or below the last applied one. Nothing changed.
    AlreadyApplied,
    /// The operation was valid when proposed but lost a race (e.g. two creates of one username).
    Rejected(String),
    /// Messages returned by a `ReadMessages`, oldest first.
    Messages(Vec<Message>),
}
