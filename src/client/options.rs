use crate::wire::CodecKind;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FailoverOptions {
    pub connect_timeout: Duration,
    /// How long to wait for the reply to one command. Should be longer than the server's commit
    /// timeout, or slow commits look like dead servers.
    pub request_timeout: Duration,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    /// Full passes over the server list before giving up.
    pub max_rounds: u32,
    pub codec: CodecKind,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        FailoverOptions {
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            backoff_start: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            max_rounds: 5,
            codec: CodecKind::Json,
        }
    }
}
