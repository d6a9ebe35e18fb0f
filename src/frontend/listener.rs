use crate::processor::{CommandProcessor, Connection};
use crate::server::ShutdownSignal;
use crate::wire::{read_codec_selector, CodecKind, FrameError, MessageCodec, WireMessage};
use futures::{SinkExt, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

/// ClientListener accepts chat client connections. Each connection gets its own task that reads
/// commands one at a time and writes replies in order, interleaved with live pushes.
pub(crate) struct ClientListener {
    logger: slog::Logger,
    listener: TcpListener,
    next_connection_id: AtomicU64,
}

impl ClientListener {
    pub(crate) async fn bind(logger: slog::Logger, addr: SocketAddr) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(ClientListener {
            logger,
            listener,
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    pub(crate) async fn run(self, processor: Arc<CommandProcessor>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    slog::info!(self.logger, "Client listener shutting down");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                        let logger = self.logger.new(slog::o!("conn" => connection_id, "peer" => peer.to_string()));
                        tokio::spawn(handle_connection(
                            logger,
                            connection_id,
                            stream,
                            processor.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => slog::warn!(self.logger, "Failed to accept connection: {:?}", e),
                },
            }
        }
    }
}

async fn handle_connection(
    logger: slog::Logger,
    connection_id: u64,
    stream: TcpStream,
    processor: Arc<CommandProcessor>,
    shutdown: ShutdownSignal,
) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let mut connection = Connection::new(connection_id, outbound_tx);

    match serve_connection(&logger, &mut connection, stream, &processor, outbound_rx, shutdown).await {
        Ok(()) => slog::debug!(logger, "Client disconnected"),
        Err(FrameError::Decode(e)) => slog::info!(logger, "Closing connection after malformed frame: {}", e),
        Err(e) => slog::debug!(logger, "Connection failed: {}", e),
    }

    processor.disconnect(&mut connection).await;
}

async fn serve_connection(
    logger: &slog::Logger,
    connection: &mut Connection,
    mut stream: TcpStream,
    processor: &CommandProcessor,
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    mut shutdown: ShutdownSignal,
) -> Result<(), FrameError> {
    let kind = read_codec_selector(&mut stream).await?;
    slog::debug!(logger, "Client speaks {:?}", kind);
    let mut framed = Framed::new(stream, MessageCodec::new(kind));

    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            incoming = framed.next() => {
                let message = match incoming {
                    Some(message) => message?,
                    None => return Ok(()),
                };
                for reply in processor.handle(connection, message).await {
                    framed.feed(encodable(logger, kind, reply)).await?;
                }
                framed.flush().await?;
            }
            Some(push) = outbound.recv() => {
                framed.send(encodable(logger, kind, push)).await?;
            }
        }
    }
}

// Only a malformed frame from the client ends a connection. A reply this codec can't carry
// becomes an error reply.
fn encodable(logger: &slog::Logger, kind: CodecKind, message: WireMessage) -> WireMessage {
    match kind.encode(&message) {
        Ok(_) => message,
        Err(e) => {
            slog::warn!(logger, "Can't encode '{}' for a {:?} client: {}", message.cmd, kind, e);
            WireMessage::new(message.cmd)
                .with_src("server")
                .with_body(format!("Reply can't be sent over this connection: {}", e))
                .into_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, ReplicaActor};
    use crate::commitlog::InMemoryLog;
    use crate::replica::{
        create_replica, ClusterTracker, ElectionStateSnapshot, LogEntry, ReplicaId, ReplicaMetadata, ReplicaTiming,
        VolatileLocalState,
    };
    use crate::server::{self, ShutdownHandle};
    use crate::store::StateStore;
    use crate::wire::{write_codec_selector, CodecKind};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    async fn start_single_node() -> (SocketAddr, ShutdownHandle) {
        let me = ReplicaMetadata::new(ReplicaId::new("solo"), SocketAddr::from(([127, 0, 0, 1], 44001)), None);
        let cluster_tracker = ClusterTracker::create_valid_cluster(me, Vec::new()).unwrap();
        let store = StateStore::new();
        let (actor_client, rx) = ActorClient::new(16);
        let (replica, mut role) = create_replica(
            logger(),
            cluster_tracker,
            InMemoryLog::<LogEntry>::new(),
            VolatileLocalState::new(ReplicaId::new("solo")),
            store.clone(),
            actor_client.weak(),
            true,
            ReplicaTiming {
                heartbeat_interval: Duration::from_millis(50),
                election_min_timeout: Duration::from_secs(30),
                election_max_timeout: Duration::from_secs(60),
                rpc_timeout: Duration::from_millis(100),
                sync_timeout: Duration::from_millis(200),
                max_entries_per_append: 16,
            },
        )
        .unwrap();

        let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
        tokio::spawn(ReplicaActor::new(logger(), rx, replica).run_event_loop(shutdown_signal.clone()));
        while role.current() != ElectionStateSnapshot::Primary {
            role.next().await;
        }

        let processor = Arc::new(CommandProcessor::new(
            logger(),
            actor_client,
            store,
            role,
            Duration::from_secs(2),
        ));
        let listener = ClientListener::bind(logger(), SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run(processor, shutdown_signal));

        (addr, shutdown_handle)
    }

    async fn connect(addr: SocketAddr, kind: CodecKind) -> Framed<TcpStream, MessageCodec> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_codec_selector(&mut stream, kind).await.unwrap();
        Framed::new(stream, MessageCodec::new(kind))
    }

    async fn call(framed: &mut Framed<TcpStream, MessageCodec>, message: WireMessage) -> WireMessage {
        framed.send(message).await.unwrap();
        framed.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn json_and_binary_clients_talk_to_each_other() {
        let (addr, _shutdown) = start_single_node().await;
        let mut alice = connect(addr, CodecKind::Json).await;
        let mut bob = connect(addr, CodecKind::Binary).await;

        for (client, name) in vec![(&mut alice, "alice"), (&mut bob, "bob")] {
            assert!(!call(client, WireMessage::new("create").with_src(name).with_body("pw")).await.error);
            assert!(!call(client, WireMessage::new("login").with_src(name).with_body("pw")).await.error);
        }

        let sent = call(&mut alice, WireMessage::new("send").with_to("bob").with_body("hello")).await;
        assert!(!sent.error, "{:?}", sent);

        let pushed = tokio::time::timeout(Duration::from_secs(2), bob.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(pushed.cmd, "deliver");
        assert_eq!(pushed.src, "alice");
        assert_eq!(pushed.body, "hello");
    }

    #[tokio::test]
    async fn oversized_body_is_refused_and_binary_reader_stays_connected() {
        let (addr, _shutdown) = start_single_node().await;
        let mut alice = connect(addr, CodecKind::Json).await;
        let mut bob = connect(addr, CodecKind::Binary).await;
        for (client, name) in vec![(&mut alice, "alice"), (&mut bob, "bob")] {
            call(client, WireMessage::new("create").with_src(name).with_body("pw")).await;
            call(client, WireMessage::new("login").with_src(name).with_body("pw")).await;
        }

        let big = call(&mut alice, WireMessage::new("send").with_to("bob").with_body("x".repeat(70_000))).await;
        assert!(big.error, "{:?}", big);
        let small = call(&mut alice, WireMessage::new("send").with_to("bob").with_body("fits")).await;
        assert!(!small.error, "{:?}", small);

        let pushed = tokio::time::timeout(Duration::from_secs(2), bob.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(pushed.body, "fits");
        let history = call(&mut bob, WireMessage::new("read").with_body("1")).await;
        assert_eq!(history.cmd, "history");
        assert_eq!(history.body, "fits");
        let count = bob.next().await.unwrap().unwrap();
        assert_eq!(count.body, "1");
    }

    #[test]
    fn reply_too_big_for_codec_becomes_error_reply() {
        let long = WireMessage::new("history").with_src("alice").with_body("x".repeat(70_000));

        let as_json = encodable(&logger(), CodecKind::Json, long.clone());
        assert_eq!(as_json, long);

        let as_binary = encodable(&logger(), CodecKind::Binary, long);
        assert!(as_binary.error);
        assert_eq!(as_binary.cmd, "history");
        assert!(CodecKind::Binary.encode(&as_binary).is_ok());
    }

    #[tokio::test]
    async fn closing_connection_logs_user_out() {
        let (addr, _shutdown) = start_single_node().await;
        let mut alice = connect(addr, CodecKind::Json).await;
        call(&mut alice, WireMessage::new("create").with_src("alice").with_body("pw")).await;
        call(&mut alice, WireMessage::new("login").with_src("alice").with_body("pw")).await;

        let mut watcher = connect(addr, CodecKind::Json).await;
        assert_eq!(call(&mut watcher, WireMessage::new("list")).await.body, "alice");

        drop(alice);
        let mut online = "alice".to_string();
        for _ in 0..50 {
            online = call(&mut watcher, WireMessage::new("list")).await.body;
            if online.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(online, "");
    }

    #[tokio::test]
    async fn garbage_frame_closes_connection() {
        let (addr, _shutdown) = start_single_node().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_codec_selector(&mut stream, CodecKind::Binary).await.unwrap();
        // Claims a 5 byte command but carries one.
        stream.write_all(&[0, 0, 0, 2, 5, b'x']).await.unwrap();

        let mut framed = Framed::new(stream, MessageCodec::new(CodecKind::Binary));
        let next = tokio::time::timeout(Duration::from_secs(2), framed.next()).await.unwrap();
        assert!(next.is_none());
    }
}
