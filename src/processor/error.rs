use crate::wire::WireMessage;
use std::net::SocketAddr;

/// Why a client command failed. Every variant becomes an error reply on the connection that sent
/// the command; none of them closes it.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Auth(String),
    #[error("not primary")]
    NotPrimary { primary_client_addr: Option<SocketAddr> },
    // The entry stays in the primary's log and may still commit.
    #[error("Timed out waiting for a majority of servers. Please retry.")]
    QuorumTimeout,
    #[error("Server failed to persist the command and stopped serving writes")]
    Durability,
    #[error("Server unavailable: {0}")]
    Unavailable(String),
}

impl CommandError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommandError::QuorumTimeout | CommandError::NotPrimary { .. } | CommandError::Unavailable(_)
        )
    }

    pub(crate) fn into_reply(self, cmd: &str) -> WireMessage {
        let reply = WireMessage::new(cmd).with_src("server").with_body(self.to_string());
        let reply = match self {
            CommandError::NotPrimary {
                primary_client_addr: Some(addr),
            } => reply.with_to(addr.to_string()),
            _ => reply,
        };
        reply.into_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_carries_primary_address() {
        let addr: SocketAddr = "127.0.0.1:7001".parse().unwrap();
        let reply = CommandError::NotPrimary {
            primary_client_addr: Some(addr),
        }
        .into_reply("send");

        assert!(reply.error);
        assert_eq!(reply.cmd, "send");
        assert_eq!(reply.body, "not primary");
        assert_eq!(reply.to, "127.0.0.1:7001");
    }

    #[test]
    fn retryable_errors() {
        assert!(CommandError::QuorumTimeout.is_retryable());
        assert!(CommandError::Unavailable("x".into()).is_retryable());
        assert!(!CommandError::Validation("x".into()).is_retryable());
        assert!(!CommandError::Auth("x".into()).is_retryable());
        assert!(!CommandError::Durability.is_retryable());
    }
}
