use crate::client::{ClientError, FailoverOptions};
use crate::wire::{write_codec_selector, FrameError, MessageCodec, WireMessage};
use futures::{SinkExt, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

// Error reply bodies that mean "try again, maybe elsewhere".
const NOT_PRIMARY: &str = "not primary";
const RETRYABLE_PREFIXES: [&str; 2] = ["Timed out waiting for a majority", "Server unavailable"];
// Error reply bodies that mean the server no longer knows our session.
const SESSION_LOST_PREFIXES: [&str; 2] = ["Session expired", "Please log in first"];

/// Replies to one command: any `history` frames, then the command's own reply.
pub type CommandOutcome = Result<Vec<WireMessage>, ClientError>;

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

// Why an attempt on the current server didn't produce an answer.
#[derive(Debug)]
enum Failure {
    Connection(String),
    Redirect { hint: Option<SocketAddr>, reason: String },
}

/// FailoverClient talks to one server at a time out of an ordered list. When that server fails or
/// isn't primary it moves on (following the redirect hint when there is one), logs back in with
/// the cached credentials, refreshes history and resends whatever hadn't been answered.
///
/// Commands are queued and sent in order. A queued command is only dropped from the queue once a
/// primary answered it.
pub struct FailoverClient {
    logger: slog::Logger,
    servers: Vec<SocketAddr>,
    current: usize,
    options: FailoverOptions,
    connection: Option<Framed<TcpStream, MessageCodec>>,
    credentials: Option<Credentials>,
    queue: VecDeque<WireMessage>,
    deliveries: Vec<WireMessage>,
    history: Vec<WireMessage>,
}

impl FailoverClient {
    pub fn new(logger: slog::Logger, servers: Vec<SocketAddr>, options: FailoverOptions) -> Result<Self, ClientError> {
        if servers.is_empty() {
            return Err(ClientError::NoServers);
        }

        Ok(FailoverClient {
            logger,
            servers,
            current: 0,
            options,
            connection: None,
            credentials: None,
            queue: VecDeque::new(),
            deliveries: Vec::new(),
            history: Vec::new(),
        })
    }

    pub async fn create_account(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        self.execute(WireMessage::new("create").with_src(username).with_body(password))
            .await
            .map(|_| ())
    }

    /// Returns the server's greeting.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<String, ClientError> {
        let replies = self
            .execute(WireMessage::new("login").with_src(username).with_body(password))
            .await?;
        Ok(final_body(replies))
    }

    /// Returns the message id. The same id is resent on every retry, so the message is stored once.
    pub async fn send(&mut self, recipient: &str, body: &str) -> Result<String, ClientError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let src = self.username().unwrap_or_default().to_string();
        self.execute(
            WireMessage::new("send")
                .with_src(src)
                .with_to(recipient)
                .with_body(body)
                .with_msg_id(message_id.as_str()),
        )
        .await?;
        Ok(message_id)
    }

    /// Limit 0 returns the whole inbox and keeps it; otherwise the oldest `limit` messages are
    /// returned and removed. A removing read carries a request id, so a retry returns the same
    /// messages instead of removing more.
    pub async fn read(&mut self, limit: u32) -> Result<Vec<WireMessage>, ClientError> {
        let request = match limit {
            0 => read_request(0),
            _ => read_request(limit).with_msg_id(uuid::Uuid::new_v4().to_string()),
        };
        let mut replies = self.execute(request).await?;
        replies.pop();
        Ok(replies)
    }

    pub async fn list(&mut self, pattern: &str) -> Result<Vec<String>, ClientError> {
        let replies = self.execute(WireMessage::new("list").with_body(pattern)).await?;
        Ok(final_body(replies)
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn whoami(&mut self) -> Result<String, ClientError> {
        let replies = self.execute(WireMessage::new("whoami")).await?;
        Ok(final_body(replies))
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.execute(WireMessage::new("logout")).await.map(|_| ())
    }

    pub async fn delete_account(&mut self) -> Result<(), ClientError> {
        let src = self.username().unwrap_or_default().to_string();
        self.execute(WireMessage::new("delete").with_src(src)).await.map(|_| ())
    }

    /// Queues a command without sending it. Fails right away if the command can't be encoded.
    pub fn enqueue(&mut self, message: WireMessage) -> Result<(), ClientError> {
        self.options.codec.encode(&message)?;
        self.queue.push_back(message);
        Ok(())
    }

    /// Sends every queued command in order, failing over as needed. Returns one outcome per
    /// command that got an answer.
    pub async fn flush(&mut self) -> Result<Vec<CommandOutcome>, ClientError> {
        let mut outcomes = Vec::with_capacity(self.queue.len());
        let mut failures_this_round = 0;
        let mut rounds = 0;
        let mut backoff = self.options.backoff_start;

        while let Some(message) = self.queue.front().cloned() {
            let attempt = match self.ensure_connected().await {
                Ok(()) => self.attempt(&message).await,
                Err(failure) => Err(failure),
            };

            match attempt {
                Ok(replies) => {
                    self.queue.pop_front();
                    outcomes.push(self.settle(&message, replies));
                    failures_this_round = 0;
                    rounds = 0;
                    backoff = self.options.backoff_start;
                }
                Err(failure) => {
                    self.fail_over(failure);
                    failures_this_round += 1;
                    if failures_this_round >= self.servers.len() {
                        failures_this_round = 0;
                        rounds += 1;
                        if rounds >= self.options.max_rounds {
                            return Err(ClientError::NoServerAvailable { rounds });
                        }
                        slog::warn!(self.logger, "No server answered in round {}. Retrying in {:?}", rounds, backoff);
                        tokio::time::sleep(backoff).await;
                        backoff = std::cmp::min(backoff * 2, self.options.backoff_max);
                    }
                }
            }
        }

        Ok(outcomes)
    }

    /// Drops the current connection. The next command goes to the next server in the list.
    pub fn disconnect(&mut self) {
        self.fail_over(Failure::Connection("disconnected by user".into()));
    }

    /// Live deliveries received since the last call.
    pub fn take_deliveries(&mut self) -> Vec<WireMessage> {
        std::mem::take(&mut self.deliveries)
    }

    /// Inbox as of the last non-destructive read, minus messages since removed by this client.
    pub fn history(&self) -> &[WireMessage] {
        &self.history
    }

    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|credentials| credentials.username.as_str())
    }

    pub fn current_server(&self) -> SocketAddr {
        self.servers[self.current]
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    async fn execute(&mut self, message: WireMessage) -> CommandOutcome {
        self.enqueue(message)?;
        match self.flush().await?.pop() {
            Some(outcome) => outcome,
            None => Ok(Vec::new()),
        }
    }

    async fn ensure_connected(&mut self) -> Result<(), Failure> {
        if self.connection.is_some() {
            return Ok(());
        }

        let addr = self.current_server();
        let mut stream = match tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Failure::Connection(format!("connect to {} failed: {}", addr, e))),
            Err(_) => return Err(Failure::Connection(format!("connect to {} timed out", addr))),
        };
        write_codec_selector(&mut stream, self.options.codec)
            .await
            .map_err(|e| Failure::Connection(e.to_string()))?;
        self.connection = Some(Framed::new(stream, MessageCodec::new(self.options.codec)));
        slog::info!(self.logger, "Connected to {}", addr);

        self.restore_session().await
    }

    // Logs back in on a fresh connection and refreshes history without consuming it.
    async fn restore_session(&mut self) -> Result<(), Failure> {
        let credentials = match self.credentials.clone() {
            Some(credentials) => credentials,
            None => return Ok(()),
        };

        let login = WireMessage::new("login")
            .with_src(credentials.username.as_str())
            .with_body(credentials.password.as_str());
        let replies = self.round_trip(&login).await?;
        if let Some(reply) = replies.last().filter(|reply| reply.error) {
            slog::warn!(self.logger, "Re-login as '{}' rejected: {}", credentials.username, reply.body);
            self.credentials = None;
            self.history.clear();
            return Ok(());
        }

        let refresh = read_request(0);
        let replies = self.round_trip(&refresh).await?;
        if let Err(e) = self.settle(&refresh, replies) {
            slog::warn!(self.logger, "History refresh failed: {}", e);
        }
        Ok(())
    }

    // A server that lost our session (new epoch, superseded login) gets a fresh login before the
    // command is resent once.
    async fn attempt(&mut self, message: &WireMessage) -> Result<Vec<WireMessage>, Failure> {
        let replies = self.round_trip(message).await?;
        if self.credentials.is_none() || message.cmd == "login" || !replies.last().map_or(false, session_lost) {
            return Ok(replies);
        }

        slog::info!(self.logger, "Session lost on {}. Logging in again.", self.current_server());
        self.restore_session().await?;
        self.round_trip(message).await
    }

    /// Sends one command and collects frames until its reply. Pushes that arrive in between are
    /// stashed as deliveries.
    async fn round_trip(&mut self, message: &WireMessage) -> Result<Vec<WireMessage>, Failure> {
        let request_timeout = self.options.request_timeout;
        let deliveries = &mut self.deliveries;
        let framed = match self.connection.as_mut() {
            Some(framed) => framed,
            None => return Err(Failure::Connection("not connected".into())),
        };

        let exchange = exchange(framed, deliveries, message);
        let frames = match tokio::time::timeout(request_timeout, exchange).await {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => return Err(Failure::Connection(e.to_string())),
            Err(_) => {
                return Err(Failure::Connection(format!(
                    "no reply to '{}' within {:?}",
                    message.cmd, request_timeout
                )))
            }
        };

        match frames.last() {
            Some(reply) if should_fail_over(reply) => Err(Failure::Redirect {
                hint: reply.to.parse().ok(),
                reason: reply.body.clone(),
            }),
            _ => Ok(frames),
        }
    }

    // Applies the client-side effects of an answered command.
    fn settle(&mut self, message: &WireMessage, replies: Vec<WireMessage>) -> CommandOutcome {
        if let Some(reply) = replies.last().filter(|reply| reply.error) {
            return Err(ClientError::Rejected {
                cmd: message.cmd.clone(),
                reason: reply.body.clone(),
            });
        }

        match message.cmd.as_str() {
            "login" => {
                self.credentials = Some(Credentials {
                    username: message.src.clone(),
                    password: message.body.clone(),
                });
            }
            "logout" | "logoff" | "delete" => {
                self.credentials = None;
                self.history.clear();
            }
            "read" => {
                let frames = &replies[..replies.len().saturating_sub(1)];
                if read_limit(message) == 0 {
                    self.history = frames.to_vec();
                } else {
                    let removed: HashSet<_> = frames.iter().filter_map(|frame| frame.msg_ids.as_ref()).collect();
                    self.history
                        .retain(|kept| kept.msg_ids.as_ref().map_or(true, |id| !removed.contains(id)));
                }
            }
            _ => {}
        }

        Ok(replies)
    }

    fn fail_over(&mut self, failure: Failure) {
        self.connection = None;
        let from = self.current_server();
        let hinted = match &failure {
            Failure::Redirect { hint: Some(hint), .. } => self
                .servers
                .iter()
                .position(|server| server == hint)
                .filter(|index| *index != self.current),
            _ => None,
        };
        self.current = hinted.unwrap_or((self.current + 1) % self.servers.len());
        slog::info!(self.logger, "Failing over from {} to {}: {:?}", from, self.current_server(), failure);
    }
}

async fn exchange(
    framed: &mut Framed<TcpStream, MessageCodec>,
    deliveries: &mut Vec<WireMessage>,
    message: &WireMessage,
) -> Result<Vec<WireMessage>, FrameError> {
    framed.send(message.clone()).await?;
    let mut frames = Vec::new();
    loop {
        let frame = match framed.next().await {
            Some(frame) => frame?,
            None => {
                return Err(FrameError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                )))
            }
        };
        if frame.cmd == "deliver" {
            deliveries.push(frame);
            continue;
        }
        let done = frame.cmd == message.cmd;
        frames.push(frame);
        if done {
            return Ok(frames);
        }
    }
}

fn read_request(limit: u32) -> WireMessage {
    // Binary frames drop `limit`, so it also rides in the body.
    WireMessage::new("read").with_body(limit.to_string()).with_limit(limit)
}

fn read_limit(message: &WireMessage) -> u32 {
    message
        .limit
        .or_else(|| message.body.trim().parse().ok())
        .unwrap_or(0)
}

fn final_body(mut replies: Vec<WireMessage>) -> String {
    replies.pop().map(|reply| reply.body).unwrap_or_default()
}

fn should_fail_over(reply: &WireMessage) -> bool {
    reply.error
        && (reply.body == NOT_PRIMARY
            || RETRYABLE_PREFIXES
                .iter()
                .any(|prefix| reply.body.starts_with(prefix)))
}

fn session_lost(reply: &WireMessage) -> bool {
    reply.error
        && SESSION_LOST_PREFIXES
            .iter()
            .any(|prefix| reply.body.starts_with(prefix))
}
