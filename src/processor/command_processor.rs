use crate::actor::ActorClient;
use crate::processor::session::ConnectionId;
use crate::processor::{CommandError, SessionRegistry};
use crate::replica::{ElectionStateChangeListener, ElectionStateSnapshot, ProposeError, ProposeInput};
use crate::store::{hash_password, ApplyOutcome, Message, Operation, StateStore};
use crate::wire::{WireMessage, MAX_BODY_LEN};
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-connection state owned by the connection's task.
pub(crate) struct Connection {
    id: ConnectionId,
    session: Option<ClientSession>,
    outbound: mpsc::UnboundedSender<WireMessage>,
}

struct ClientSession {
    username: String,
    token: String,
}

impl Connection {
    /// `outbound` receives pushes (live deliveries) for whoever logs in on this connection.
    pub(crate) fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<WireMessage>) -> Self {
        Connection {
            id,
            session: None,
            outbound,
        }
    }

    pub(crate) fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.username.as_str())
    }
}

/// CommandProcessor validates client commands, pushes state changes through the replica's commit
/// path, and answers read-only commands straight from the store.
pub(crate) struct CommandProcessor {
    logger: slog::Logger,
    actor_client: ActorClient,
    store: StateStore,
    role: ElectionStateChangeListener,
    sessions: SessionRegistry,
    commit_timeout: Duration,
}

impl CommandProcessor {
    pub(crate) fn new(
        logger: slog::Logger,
        actor_client: ActorClient,
        store: StateStore,
        role: ElectionStateChangeListener,
        commit_timeout: Duration,
    ) -> Self {
        CommandProcessor {
            logger,
            actor_client,
            store,
            role,
            sessions: SessionRegistry::new(),
            commit_timeout,
        }
    }

    /// Returns every frame to write back, in order. Failures become a single error reply.
    pub(crate) async fn handle(&self, connection: &mut Connection, message: WireMessage) -> Vec<WireMessage> {
        let cmd = message.cmd.clone();
        match self.dispatch(connection, message).await {
            Ok(replies) => replies,
            Err(e) => {
                slog::debug!(self.logger, "Command '{}' failed: {}", cmd, e; "conn" => connection.id);
                vec![e.into_reply(&cmd)]
            }
        }
    }

    async fn dispatch(&self, connection: &mut Connection, message: WireMessage) -> Result<Vec<WireMessage>, CommandError> {
        match message.cmd.as_str() {
            "create" => self.create(message).await.map(|reply| vec![reply]),
            "login" => self.login(connection, message).await.map(|reply| vec![reply]),
            "logout" | "logoff" => self.logout(connection, message).await.map(|reply| vec![reply]),
            "delete" => self.delete(connection, message).await.map(|reply| vec![reply]),
            "send" => self.send(connection, message).await.map(|reply| vec![reply]),
            "read" => self.read(connection, message).await,
            "list" => Ok(vec![self.list(message)]),
            "whoami" => self.whoami(connection).map(|reply| vec![reply]),
            other => Err(CommandError::Validation(format!("Unknown command '{}'", other))),
        }
    }

    async fn create(&self, message: WireMessage) -> Result<WireMessage, CommandError> {
        let username = message.src.trim();
        validate_username(username)?;
        if message.body.is_empty() {
            return Err(CommandError::Validation("Password is required".into()));
        }
        self.ensure_primary()?;
        if self.store.account_exists(username) {
            return Err(CommandError::Validation("Username already exists".into()));
        }

        let outcome = self
            .commit(Operation::CreateAccount {
                username: username.to_string(),
                password_hash: hash_password(username, &message.body),
            })
            .await?;
        expect_applied(outcome)?;

        Ok(reply("create", username, "Account created"))
    }

    async fn login(&self, connection: &mut Connection, message: WireMessage) -> Result<WireMessage, CommandError> {
        let username = message.src.trim();
        if username.is_empty() || message.body.is_empty() {
            return Err(CommandError::Validation("Username and password are required".into()));
        }
        self.ensure_primary()?;
        if let Some(current) = connection.username() {
            if current != username {
                return Err(CommandError::Validation(format!(
                    "Already logged in as '{}'. Log out first.",
                    current
                )));
            }
        }
        if !self
            .store
            .verify_credentials(username, &hash_password(username, &message.body))
        {
            return Err(CommandError::Auth("Invalid username or password".into()));
        }

        let token = uuid::Uuid::new_v4().to_string();
        let outcome = self
            .commit(Operation::Login {
                username: username.to_string(),
                session_token: token.clone(),
            })
            .await?;
        expect_applied(outcome)?;

        self.sessions
            .register(username, connection.id, connection.outbound.clone());
        connection.session = Some(ClientSession {
            username: username.to_string(),
            token,
        });
        slog::info!(self.logger, "User '{}' logged in", username; "conn" => connection.id);

        let unread = self
            .store
            .inbox(username)
            .iter()
            .filter(|message| !message.delivered)
            .count();
        Ok(reply(
            "login",
            username,
            format!("Login successful. {} unread messages.", unread),
        ))
    }

    async fn logout(&self, connection: &mut Connection, message: WireMessage) -> Result<WireMessage, CommandError> {
        self.ensure_primary()?;
        let (username, token) = self.require_session(connection)?;

        let outcome = self
            .commit(Operation::Logout {
                username: username.clone(),
                session_token: token,
            })
            .await?;
        expect_applied(outcome)?;
        self.end_session(connection);

        Ok(reply(&message.cmd, &username, "Logged out"))
    }

    async fn delete(&self, connection: &mut Connection, message: WireMessage) -> Result<WireMessage, CommandError> {
        self.ensure_primary()?;
        let (username, _) = self.require_session(connection)?;
        if !message.src.is_empty() && message.src != username {
            return Err(CommandError::Auth("Can only delete your own account".into()));
        }

        let outcome = self
            .commit(Operation::DeleteAccount {
                username: username.clone(),
            })
            .await?;
        expect_applied(outcome)?;
        self.end_session(connection);
        slog::info!(self.logger, "Deleted account '{}'", username; "conn" => connection.id);

        Ok(reply("delete", &username, "Account deleted"))
    }

    async fn send(&self, connection: &mut Connection, message: WireMessage) -> Result<WireMessage, CommandError> {
        self.ensure_primary()?;
        let (sender, _) = self.require_session(connection)?;
        let recipient = message.to.trim();
        if recipient.is_empty() {
            return Err(CommandError::Validation("Recipient is required".into()));
        }
        // Stored messages must fit every codec's body field.
        if message.body.len() > MAX_BODY_LEN {
            return Err(CommandError::Validation(format!(
                "Message is too long ({} bytes, max {})",
                message.body.len(),
                MAX_BODY_LEN
            )));
        }
        let message_id = message
            .msg_ids
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // A retry of a send that already committed.
        if self.store.contains_message(&message_id) {
            return Ok(reply("send", &sender, "Message sent").with_msg_id(message_id));
        }
        if !self.store.account_exists(recipient) {
            return Err(CommandError::Validation("Recipient does not exist".into()));
        }

        let outcome = self
            .commit(Operation::SendMessage {
                message_id: message_id.clone(),
                sender: sender.clone(),
                recipient: recipient.to_string(),
                body: message.body.clone(),
            })
            .await?;
        expect_applied(outcome)?;

        let delivered = self.sessions.push(
            recipient,
            WireMessage::new("deliver")
                .with_src(sender.as_str())
                .with_to(recipient)
                .with_body(message.body)
                .with_msg_id(message_id.as_str()),
        );
        slog::debug!(self.logger, "Message {} from '{}' to '{}' (pushed: {})", message_id, sender, recipient, delivered);

        Ok(reply("send", &sender, "Message sent").with_msg_id(message_id))
    }

    async fn read(&self, connection: &mut Connection, message: WireMessage) -> Result<Vec<WireMessage>, CommandError> {
        self.ensure_primary()?;
        let (username, _) = self.require_session(connection)?;
        let limit = match message.limit {
            Some(limit) => limit,
            None => parse_limit(&message.body)?,
        };

        let outcome = self
            .commit(Operation::ReadMessages {
                username: username.clone(),
                limit,
                request_id: message.msg_ids.clone().filter(|id| limit > 0 && !id.is_empty()),
            })
            .await?;
        let messages = match outcome {
            ApplyOutcome::Messages(messages) => messages,
            ApplyOutcome::Rejected(reason) => return Err(CommandError::Validation(reason)),
            other => {
                slog::error!(self.logger, "Unexpected outcome for read: {:?}", other);
                Vec::new()
            }
        };

        let count = messages.len();
        let mut replies: Vec<WireMessage> = messages.into_iter().map(history_frame).collect();
        replies.push(reply("read", &username, count.to_string()));
        Ok(replies)
    }

    fn list(&self, message: WireMessage) -> WireMessage {
        let users = self.store.online_users(message.body.trim());
        reply("list", &message.src, users.join(","))
    }

    fn whoami(&self, connection: &mut Connection) -> Result<WireMessage, CommandError> {
        let (username, _) = self.require_session(connection)?;
        Ok(reply("whoami", &username, username.as_str()))
    }

    /// Best effort logout of whoever was logged in on a closed connection.
    pub(crate) async fn disconnect(&self, connection: &mut Connection) {
        let session = match connection.session.take() {
            Some(session) => session,
            None => return,
        };
        self.sessions.unregister(&session.username, connection.id);
        if self.ensure_primary().is_err() {
            return;
        }

        let result = self
            .commit(Operation::Logout {
                username: session.username.clone(),
                session_token: session.token,
            })
            .await;
        slog::debug!(
            self.logger,
            "Logout of '{}' on disconnect: {:?}",
            session.username,
            result.map(|_| ());
            "conn" => connection.id
        );
    }

    fn ensure_primary(&self) -> Result<(), CommandError> {
        match self.role.current() {
            // Commands proposed while syncing wait for the sync to finish.
            ElectionStateSnapshot::Primary | ElectionStateSnapshot::PrimarySyncing => Ok(()),
            ElectionStateSnapshot::Backup(hint) => Err(CommandError::NotPrimary {
                primary_client_addr: hint.client_addr,
            }),
            ElectionStateSnapshot::Candidate | ElectionStateSnapshot::BackupNoPrimary => {
                Err(CommandError::NotPrimary {
                    primary_client_addr: None,
                })
            }
        }
    }

    /// The connection's session, if it's still the user's live one.
    fn require_session(&self, connection: &mut Connection) -> Result<(String, String), CommandError> {
        let session = match &connection.session {
            Some(session) => session,
            None => return Err(CommandError::Auth("Please log in first".into())),
        };
        if !self.store.session_matches(&session.username, &session.token) {
            self.end_session(connection);
            return Err(CommandError::Auth("Session expired. Please log in again.".into()));
        }

        Ok((session.username.clone(), session.token.clone()))
    }

    fn end_session(&self, connection: &mut Connection) {
        if let Some(session) = connection.session.take() {
            self.sessions.unregister(&session.username, connection.id);
        }
    }

    async fn commit(&self, operation: Operation) -> Result<ApplyOutcome, CommandError> {
        let kind = operation.kind();
        let proposal = self.actor_client.propose(ProposeInput { operation });
        match tokio::time::timeout(self.commit_timeout, proposal).await {
            Ok(Ok(output)) => {
                slog::debug!(self.logger, "Committed {} at {:?}", kind, output.sequence);
                Ok(output.outcome)
            }
            Ok(Err(ProposeError::NotPrimary { hint })) => Err(CommandError::NotPrimary {
                primary_client_addr: hint.and_then(|hint| hint.client_addr),
            }),
            Ok(Err(ProposeError::LostPrimacy)) => {
                Err(CommandError::Unavailable("Lost primacy before the command committed".into()))
            }
            Ok(Err(ProposeError::Durability(e))) => {
                slog::error!(self.logger, "Durability failure committing {}: {:?}", kind, e);
                Err(CommandError::Durability)
            }
            Ok(Err(ProposeError::ActorExited)) => Err(CommandError::Unavailable("Replica has stopped".into())),
            Err(_timeout) => {
                slog::warn!(self.logger, "Timed out committing {}", kind);
                Err(CommandError::QuorumTimeout)
            }
        }
    }
}

fn reply(cmd: &str, to: &str, body: impl Into<String>) -> WireMessage {
    WireMessage::new(cmd).with_src("server").with_to(to).with_body(body)
}

fn history_frame(message: Message) -> WireMessage {
    WireMessage::new("history")
        .with_src(message.sender)
        .with_to(message.recipient)
        .with_body(message.body)
        .with_msg_id(message.id)
}

fn expect_applied(outcome: ApplyOutcome) -> Result<(), CommandError> {
    match outcome {
        ApplyOutcome::Rejected(reason) => Err(CommandError::Validation(reason)),
        _ => Ok(()),
    }
}

// Usernames end up in comma separated lists and in 255 byte binary fields.
fn validate_username(username: &str) -> Result<(), CommandError> {
    if username.is_empty() {
        return Err(CommandError::Validation("Username is required".into()));
    }
    if username.len() > u8::MAX as usize {
        return Err(CommandError::Validation("Username is too long".into()));
    }
    if username.chars().any(|c| c == ',' || c.is_whitespace()) {
        return Err(CommandError::Validation(
            "Username can't contain commas or whitespace".into(),
        ));
    }
    Ok(())
}

fn parse_limit(body: &str) -> Result<u32, CommandError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(0);
    }
    body.parse()
        .map_err(|_| CommandError::Validation(format!("Invalid read limit '{}'", body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ReplicaActor;
    use crate::commitlog::InMemoryLog;
    use crate::replica::{
        create_replica, ClusterTracker, LogEntry, ReplicaId, ReplicaMetadata, ReplicaTiming, VolatileLocalState,
    };
    use crate::server::{self, ShutdownHandle};
    use std::net::SocketAddr;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn timing() -> ReplicaTiming {
        ReplicaTiming {
            heartbeat_interval: Duration::from_millis(50),
            election_min_timeout: Duration::from_secs(30),
            election_max_timeout: Duration::from_secs(60),
            rpc_timeout: Duration::from_millis(100),
            sync_timeout: Duration::from_millis(200),
            max_entries_per_append: 16,
        }
    }

    fn metadata(id: &str, port: u16) -> ReplicaMetadata {
        ReplicaMetadata::new(ReplicaId::new(id), SocketAddr::from(([127, 0, 0, 1], port)), None)
    }

    /// Processor on top of a replica. A lone replica elects itself; one with (unreachable) peers
    /// stays a backup that doesn't know the primary.
    async fn processor(with_peers: bool) -> (CommandProcessor, ShutdownHandle) {
        let peers = if with_peers {
            vec![metadata("b", 43002), metadata("c", 43003)]
        } else {
            Vec::new()
        };
        let cluster_tracker = ClusterTracker::create_valid_cluster(metadata("a", 43001), peers).unwrap();
        let store = StateStore::new();
        let (actor_client, rx) = ActorClient::new(16);
        let (replica, mut role) = create_replica(
            logger(),
            cluster_tracker,
            InMemoryLog::<LogEntry>::new(),
            VolatileLocalState::new(ReplicaId::new("a")),
            store.clone(),
            actor_client.weak(),
            !with_peers,
            timing(),
        )
        .unwrap();

        let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
        tokio::spawn(ReplicaActor::new(logger(), rx, replica).run_event_loop(shutdown_signal));

        if !with_peers {
            while role.current() != ElectionStateSnapshot::Primary {
                tokio::time::timeout(Duration::from_secs(5), role.next())
                    .await
                    .expect("Timed out waiting for election");
            }
        }

        let processor = CommandProcessor::new(logger(), actor_client, store, role, Duration::from_secs(2));
        (processor, shutdown_handle)
    }

    fn connection(id: ConnectionId) -> (Connection, mpsc::UnboundedReceiver<WireMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(id, tx), rx)
    }

    async fn one(processor: &CommandProcessor, connection: &mut Connection, message: WireMessage) -> WireMessage {
        let mut replies = processor.handle(connection, message).await;
        assert_eq!(replies.len(), 1, "Expected one reply, got {:?}", replies);
        replies.remove(0)
    }

    async fn signed_up(processor: &CommandProcessor, id: ConnectionId, username: &str) -> (Connection, mpsc::UnboundedReceiver<WireMessage>) {
        let (mut conn, rx) = connection(id);
        let created = one(processor, &mut conn, WireMessage::new("create").with_src(username).with_body("pw")).await;
        assert!(!created.error, "{:?}", created);
        let login = one(processor, &mut conn, WireMessage::new("login").with_src(username).with_body("pw")).await;
        assert!(!login.error, "{:?}", login);
        (conn, rx)
    }

    fn read(limit: u32) -> WireMessage {
        WireMessage::new("read").with_limit(limit)
    }

    #[tokio::test]
    async fn account_lifecycle() {
        let (processor, _shutdown) = processor(false).await;
        let (mut conn, _rx) = connection(1);

        let create = WireMessage::new("create").with_src("alice").with_body("pw");
        assert!(!one(&processor, &mut conn, create.clone()).await.error);
        let duplicate = one(&processor, &mut conn, create).await;
        assert!(duplicate.error);
        assert_eq!(duplicate.body, "Username already exists");

        let bad_login = one(&processor, &mut conn, WireMessage::new("login").with_src("alice").with_body("nope")).await;
        assert!(bad_login.error);
        assert_eq!(conn.username(), None);

        let login = one(&processor, &mut conn, WireMessage::new("login").with_src("alice").with_body("pw")).await;
        assert!(!login.error, "{:?}", login);
        assert_eq!(conn.username(), Some("alice"));
        assert_eq!(one(&processor, &mut conn, WireMessage::new("whoami")).await.body, "alice");
        assert_eq!(one(&processor, &mut conn, WireMessage::new("list").with_body("*")).await.body, "alice");

        assert!(!one(&processor, &mut conn, WireMessage::new("logoff")).await.error);
        assert_eq!(conn.username(), None);
        assert_eq!(one(&processor, &mut conn, WireMessage::new("list")).await.body, "");
        assert!(one(&processor, &mut conn, WireMessage::new("whoami")).await.error);

        one(&processor, &mut conn, WireMessage::new("login").with_src("alice").with_body("pw")).await;
        assert!(!one(&processor, &mut conn, WireMessage::new("delete").with_src("alice")).await.error);
        let gone = one(&processor, &mut conn, WireMessage::new("login").with_src("alice").with_body("pw")).await;
        assert!(gone.error);
    }

    #[tokio::test]
    async fn history_is_kept_until_read_with_limit() {
        let (processor, _shutdown) = processor(false).await;
        let (mut alice, _alice_rx) = signed_up(&processor, 1, "alice").await;
        let (mut bob, mut bob_rx) = signed_up(&processor, 2, "bob").await;

        let sent = one(&processor, &mut alice, WireMessage::new("send").with_to("bob").with_body("hi")).await;
        assert!(!sent.error, "{:?}", sent);

        // Live push to bob's connection.
        let pushed = bob_rx.try_recv().unwrap();
        assert_eq!(pushed.cmd, "deliver");
        assert_eq!(pushed.src, "alice");
        assert_eq!(pushed.body, "hi");
        assert_eq!(pushed.msg_ids, sent.msg_ids);

        for _ in 0..2 {
            let replies = processor.handle(&mut bob, read(0)).await;
            assert_eq!(replies.len(), 2);
            assert_eq!(replies[0].cmd, "history");
            assert_eq!(replies[0].body, "hi");
            assert_eq!(replies[1].cmd, "read");
            assert_eq!(replies[1].body, "1");
        }

        let replies = processor.handle(&mut bob, read(1)).await;
        assert_eq!(replies[0].body, "hi");
        let replies = processor.handle(&mut bob, WireMessage::new("read").with_body("0")).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "0");
    }

    #[tokio::test]
    async fn duplicate_send_is_not_applied_twice() {
        let (processor, _shutdown) = processor(false).await;
        let (mut alice, _alice_rx) = signed_up(&processor, 1, "alice").await;
        let (mut bob, _bob_rx) = signed_up(&processor, 2, "bob").await;

        let send = WireMessage::new("send").with_to("bob").with_body("once").with_msg_id("m-1");
        assert!(!one(&processor, &mut alice, send.clone()).await.error);
        let retry = one(&processor, &mut alice, send).await;
        assert!(!retry.error);
        assert_eq!(retry.msg_ids.as_deref(), Some("m-1"));

        let replies = processor.handle(&mut bob, read(0)).await;
        assert_eq!(replies.len(), 2);
    }

    #[tokio::test]
    async fn retried_read_with_same_id_returns_same_batch() {
        let (processor, _shutdown) = processor(false).await;
        let (mut alice, _alice_rx) = signed_up(&processor, 1, "alice").await;
        let (mut bob, _bob_rx) = signed_up(&processor, 2, "bob").await;
        for body in &["one", "two"] {
            one(&processor, &mut alice, WireMessage::new("send").with_to("bob").with_body(*body)).await;
        }

        let read_once = read(1).with_msg_id("read-1");
        let first = processor.handle(&mut bob, read_once.clone()).await;
        let retry = processor.handle(&mut bob, read_once).await;
        assert_eq!(first, retry);
        assert_eq!(first[0].body, "one");

        let rest = processor.handle(&mut bob, read(0)).await;
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].body, "two");
    }

    #[tokio::test]
    async fn body_too_long_for_binary_is_rejected() {
        let (processor, _shutdown) = processor(false).await;
        let (mut alice, _alice_rx) = signed_up(&processor, 1, "alice").await;
        let (mut bob, _bob_rx) = signed_up(&processor, 2, "bob").await;

        let too_long = WireMessage::new("send").with_to("bob").with_body("x".repeat(MAX_BODY_LEN + 1));
        let rejected = one(&processor, &mut alice, too_long).await;
        assert!(rejected.error);
        assert!(rejected.body.starts_with("Message is too long"), "{:?}", rejected.body);

        let at_limit = WireMessage::new("send").with_to("bob").with_body("x".repeat(MAX_BODY_LEN));
        assert!(!one(&processor, &mut alice, at_limit).await.error);
        assert_eq!(processor.handle(&mut bob, read(0)).await.len(), 2);
    }

    #[tokio::test]
    async fn validation_and_auth_errors() {
        let (processor, _shutdown) = processor(false).await;
        let (mut anon, _rx) = connection(1);

        let unauthenticated = one(&processor, &mut anon, WireMessage::new("send").with_to("bob").with_body("x")).await;
        assert!(unauthenticated.error);
        assert_eq!(unauthenticated.body, "Please log in first");

        let bad_name = one(&processor, &mut anon, WireMessage::new("create").with_src("a,b").with_body("pw")).await;
        assert!(bad_name.error);

        let (mut alice, _alice_rx) = signed_up(&processor, 2, "alice").await;
        let nobody = one(&processor, &mut alice, WireMessage::new("send").with_to("nobody").with_body("x")).await;
        assert!(nobody.error);
        assert_eq!(nobody.body, "Recipient does not exist");

        let bad_limit = one(&processor, &mut alice, WireMessage::new("read").with_body("lots")).await;
        assert!(bad_limit.error);

        assert!(one(&processor, &mut alice, WireMessage::new("shout")).await.error);
    }

    #[tokio::test]
    async fn superseded_session_must_log_in_again() {
        let (processor, _shutdown) = processor(false).await;
        let (mut first, _rx1) = signed_up(&processor, 1, "alice").await;
        let (mut second, _rx2) = connection(2);
        one(&processor, &mut second, WireMessage::new("login").with_src("alice").with_body("pw")).await;

        let stale = one(&processor, &mut first, WireMessage::new("whoami")).await;
        assert!(stale.error);
        assert_eq!(first.username(), None);
        assert_eq!(one(&processor, &mut second, WireMessage::new("whoami")).await.body, "alice");

        // Closing the stale connection doesn't log out the new session.
        processor.disconnect(&mut first).await;
        assert_eq!(one(&processor, &mut second, WireMessage::new("whoami")).await.body, "alice");
        processor.disconnect(&mut second).await;
        assert_eq!(one(&processor, &mut first, WireMessage::new("list")).await.body, "");
    }

    #[tokio::test]
    async fn backup_redirects_writes_but_answers_list() {
        let (processor, _shutdown) = processor(true).await;
        let (mut conn, _rx) = connection(1);

        let create = one(&processor, &mut conn, WireMessage::new("create").with_src("alice").with_body("pw")).await;
        assert!(create.error);
        assert_eq!(create.body, "not primary");
        assert_eq!(create.to, "");

        assert!(!one(&processor, &mut conn, WireMessage::new("list")).await.error);
    }
}
