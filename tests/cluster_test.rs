use quorum_chat::{
    try_start_server, ChatServerHandle, ClientError, FailoverClient, FailoverOptions, PeerConfig, ReplicationOptions,
    RoleEvent, ServerConfig, WireMessage,
};
use slog::Drain;
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::time::{Duration, Instant};

const NUM_NODES: usize = 3;

struct Cluster {
    nodes: HashMap<String, ChatServerHandle>,
    client_addrs: Vec<SocketAddr>,
    _data_dirs: Vec<TempDir>,
}

impl Cluster {
    async fn start(port_base: u16) -> Result<Self, Box<dyn Error>> {
        let mut nodes = HashMap::with_capacity(NUM_NODES);
        let mut client_addrs = Vec::with_capacity(NUM_NODES);
        let mut data_dirs = Vec::with_capacity(NUM_NODES);

        for i in 0..NUM_NODES {
            let data_dir = tempfile::tempdir()?;
            let config = node_config(i, port_base, &data_dir);
            client_addrs.push(config.client_addr);
            let handle = try_start_server(config, create_test_logger(node_id(i))).await?;
            nodes.insert(node_id(i), handle);
            data_dirs.push(data_dir);
        }

        Ok(Cluster {
            nodes,
            client_addrs,
            _data_dirs: data_dirs,
        })
    }

    /// Waits until exactly one node is serving as primary and returns its id.
    async fn wait_for_primary(&self, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        loop {
            let primaries: Vec<&String> = self
                .nodes
                .iter()
                .filter(|(_, handle)| handle.events().current() == RoleEvent::Primary)
                .map(|(id, _)| id)
                .collect();
            if primaries.len() == 1 {
                return primaries[0].clone();
            }
            assert!(primaries.len() < 2, "Two primaries at once: {:?}", primaries);
            assert!(Instant::now() < deadline, "Timeout waiting for primary election");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn kill(&mut self, node: &str) {
        let handle = self.nodes.remove(node).expect("No such node");
        handle.shutdown();
    }

    fn client(&self) -> FailoverClient {
        FailoverClient::new(
            create_test_logger("client".into()),
            self.client_addrs.clone(),
            FailoverOptions {
                connect_timeout: Duration::from_millis(500),
                request_timeout: Duration::from_secs(4),
                backoff_start: Duration::from_millis(100),
                backoff_max: Duration::from_millis(800),
                max_rounds: 30,
                ..FailoverOptions::default()
            },
        )
        .expect("Client needs servers")
    }

    /// A client that only knows `node`.
    fn client_of(&self, node: &str, max_rounds: u32) -> FailoverClient {
        let index = (0..NUM_NODES).find(|i| node_id(*i) == node).expect("No such node");
        FailoverClient::new(
            create_test_logger("client".into()),
            vec![self.client_addrs[index]],
            FailoverOptions {
                connect_timeout: Duration::from_millis(500),
                request_timeout: Duration::from_secs(4),
                backoff_start: Duration::from_millis(100),
                backoff_max: Duration::from_millis(100),
                max_rounds,
                ..FailoverOptions::default()
            },
        )
        .expect("Client needs servers")
    }

    /// Waits until every live node has applied a message with `body`.
    async fn wait_until_replicated(&self, body: &str, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        for (id, handle) in &self.nodes {
            while !handle.store_snapshot().messages.iter().any(|m| m.body == body) {
                assert!(Instant::now() < deadline, "Node {} never applied '{}'", id, body);
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }
}

#[tokio::test]
async fn elects_one_primary_and_replicates_commits() -> Result<(), Box<dyn Error>> {
    let cluster = Cluster::start(47100).await?;
    let primary = cluster.wait_for_primary(Duration::from_secs(10)).await;

    // Every backup learns who the primary is.
    for (id, handle) in &cluster.nodes {
        if *id == primary {
            continue;
        }
        let mut events = handle.events();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let RoleEvent::Backup(data) = events.current() {
                assert_eq!(data.primary_id, primary);
                break;
            }
            tokio::time::timeout_at(deadline, events.next_event())
                .await
                .expect("Timeout waiting for backup to learn the primary");
        }
    }

    let mut alice = cluster.client();
    alice.create_account("alice", "pw").await?;
    alice.create_account("bob", "pw").await?;
    alice.login("alice", "pw").await?;
    alice.send("bob", "replicated").await?;

    cluster.wait_until_replicated("replicated", Duration::from_secs(5)).await;
    let snapshots: Vec<_> = cluster.nodes.values().map(|handle| handle.store_snapshot()).collect();
    for snapshot in &snapshots {
        assert_eq!(snapshot.accounts.len(), 2);
        assert_eq!(snapshot.messages.len(), 1);
    }

    Ok(())
}

#[tokio::test]
async fn history_survives_non_destructive_reads() -> Result<(), Box<dyn Error>> {
    let cluster = Cluster::start(47200).await?;
    cluster.wait_for_primary(Duration::from_secs(10)).await;

    let mut alice = cluster.client();
    alice.create_account("alice", "pw").await?;
    alice.create_account("bob", "pw").await?;
    alice.login("alice", "pw").await?;
    alice.send("bob", "hi").await?;

    let mut bob = cluster.client();
    bob.login("bob", "pw").await?;
    for _ in 0..2 {
        let history = bob.read(0).await?;
        assert_eq!(bodies(&history), vec!["hi"]);
    }
    assert_eq!(bodies(bob.history()), vec!["hi"]);

    let consumed = bob.read(1).await?;
    assert_eq!(bodies(&consumed), vec!["hi"]);
    assert!(bob.read(0).await?.is_empty());
    assert!(bob.history().is_empty());

    // Read-only commands answer from the store.
    assert_eq!(bob.whoami().await?, "bob");
    let mut online = bob.list("*").await?;
    online.sort();
    assert_eq!(online, vec!["alice", "bob"]);

    Ok(())
}

#[tokio::test]
async fn new_primary_keeps_committed_messages() -> Result<(), Box<dyn Error>> {
    let mut cluster = Cluster::start(47300).await?;
    let old_primary = cluster.wait_for_primary(Duration::from_secs(10)).await;

    let mut alice = cluster.client();
    alice.create_account("alice", "pw").await?;
    alice.create_account("bob", "pw").await?;
    alice.login("alice", "pw").await?;
    alice.send("bob", "msg1").await?;

    let mut bob = cluster.client();
    bob.login("bob", "pw").await?;
    assert_eq!(bodies(&bob.read(0).await?), vec!["msg1"]);

    cluster.kill(&old_primary);
    let new_primary = cluster.wait_for_primary(Duration::from_secs(10)).await;
    assert_ne!(new_primary, old_primary);

    // The client finds the new primary, logs back in and still sees the message.
    let history = bob.read(0).await?;
    assert_eq!(bodies(&history), vec!["msg1"]);
    assert_eq!(bob.whoami().await?, "bob");
    assert_eq!(bodies(bob.history()), vec!["msg1"]);

    // Writes keep working with two of three nodes.
    alice.send("bob", "msg2").await?;
    assert_eq!(bodies(&bob.read(0).await?), vec!["msg1", "msg2"]);

    Ok(())
}

#[tokio::test]
async fn retried_commands_apply_once() -> Result<(), Box<dyn Error>> {
    let cluster = Cluster::start(47400).await?;
    cluster.wait_for_primary(Duration::from_secs(10)).await;

    let mut alice = cluster.client();
    alice.create_account("alice", "pw").await?;
    match alice.create_account("alice", "other").await {
        Err(ClientError::Rejected { reason, .. }) => assert_eq!(reason, "Username already exists"),
        other => panic!("Expected duplicate account rejection, got {:?}", other),
    }
    alice.create_account("bob", "pw").await?;
    alice.login("alice", "pw").await?;

    // Same message id twice, as a client would resend after a lost reply.
    let send = WireMessage::new("send")
        .with_src("alice")
        .with_to("bob")
        .with_body("only once")
        .with_msg_id("retry-1");
    alice.enqueue(send.clone())?;
    alice.enqueue(send)?;
    let outcomes = alice.flush().await?;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(Result::is_ok));

    let mut bob = cluster.client();
    bob.login("bob", "pw").await?;
    assert_eq!(bodies(&bob.read(0).await?), vec!["only once"]);

    cluster.wait_until_replicated("only once", Duration::from_secs(5)).await;
    for handle in cluster.nodes.values() {
        let snapshot = handle.store_snapshot();
        assert_eq!(snapshot.accounts.len(), 2);
        assert_eq!(snapshot.messages.len(), 1);
    }

    Ok(())
}

#[tokio::test]
async fn write_without_quorum_is_not_applied() -> Result<(), Box<dyn Error>> {
    let mut cluster = Cluster::start(47500).await?;
    let primary = cluster.wait_for_primary(Duration::from_secs(10)).await;

    let mut alice = cluster.client_of(&primary, 1);
    alice.create_account("alice", "pw").await?;
    alice.create_account("bob", "pw").await?;
    alice.login("alice", "pw").await?;

    let backups: Vec<String> = cluster.nodes.keys().filter(|id| **id != primary).cloned().collect();
    for backup in &backups {
        cluster.kill(backup);
    }

    match alice.send("bob", "lost quorum").await {
        Err(ClientError::NoServerAvailable { rounds: 1 }) => {}
        other => panic!("Expected the send to time out, got {:?}", other),
    }
    assert_eq!(alice.queued(), 1);

    let snapshot = cluster.nodes[&primary].store_snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.accounts.len(), 2);

    Ok(())
}

fn bodies(messages: &[WireMessage]) -> Vec<&str> {
    messages.iter().map(|message| message.body.as_str()).collect()
}

fn node_config(i: usize, port_base: u16, data_dir: &TempDir) -> ServerConfig {
    let mut peers = Vec::with_capacity(NUM_NODES - 1);
    for j in (0..NUM_NODES).filter(|j| *j != i) {
        peers.push(PeerConfig {
            id: node_id(j),
            host: "127.0.0.1".to_string(),
            port: replication_port(port_base, j),
            client_port: Some(client_port(port_base, j)),
        });
    }

    ServerConfig {
        node_id: node_id(i),
        client_addr: SocketAddr::from(([127, 0, 0, 1], client_port(port_base, i))),
        replication_addr: SocketAddr::from(([127, 0, 0, 1], replication_port(port_base, i))),
        data_dir: data_dir.path().to_path_buf(),
        initial_primary: i == 0,
        peers,
        options: ReplicationOptions {
            heartbeat_interval: Some(Duration::from_millis(50)),
            election_timeout_min: Some(Duration::from_millis(400)),
            election_timeout_max: Some(Duration::from_millis(800)),
            rpc_timeout: Some(Duration::from_millis(150)),
            commit_timeout: Some(Duration::from_secs(2)),
            sync_timeout: Some(Duration::from_millis(500)),
            ..ReplicationOptions::default()
        },
    }
}

fn client_port(port_base: u16, i: usize) -> u16 {
    port_base + i as u16
}

fn replication_port(port_base: u16, i: usize) -> u16 {
    port_base + 50 + i as u16
}

fn node_id(i: usize) -> String {
    format!("node-{}", i + 1)
}

fn create_test_logger(name: String) -> slog::Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Name" => name))
}
