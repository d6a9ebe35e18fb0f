use crate::api::{ReplicationOptions, ServerStartError};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Everything one server process needs to know. Loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub node_id: String,
    /// Where chat clients connect.
    pub client_addr: SocketAddr,
    /// Where peers send replication RPCs.
    pub replication_addr: SocketAddr,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub initial_primary: bool,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub options: ReplicationOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub host: String,
    /// Replication port.
    pub port: u16,
    /// Chat client port, used when redirecting clients to this peer.
    #[serde(default)]
    pub client_port: Option<u16>,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerStartError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ServerStartError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ServerStartError> {
        Ok(serde_json::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[test]
    fn parses_full_config() {
        let config = ServerConfig::from_json(
            r#"{
                "node_id": "a",
                "client_addr": "127.0.0.1:7001",
                "replication_addr": "127.0.0.1:8001",
                "data_dir": "/tmp/quorum-chat/a",
                "initial_primary": true,
                "peers": [
                    {"id": "b", "host": "127.0.0.1", "port": 8002, "client_port": 7002},
                    {"id": "c", "host": "localhost", "port": 8003}
                ],
                "options": {"election_timeout_min_ms": 150, "election_timeout_max_ms": 300}
            }"#,
        )
        .unwrap();

        assert_eq!(config.node_id, "a");
        assert!(config.initial_primary);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[0].client_port, Some(7002));
        assert_eq!(config.peers[1].client_port, None);
        assert_eq!(config.options.election_timeout_min, Some(Duration::from_millis(150)));
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let config = ServerConfig::from_json(
            r#"{"node_id": "solo", "client_addr": "0.0.0.0:7001", "replication_addr": "0.0.0.0:8001", "data_dir": "data"}"#,
        )
        .unwrap();
        assert!(!config.initial_primary);
        assert!(config.peers.is_empty());
        assert!(config.options.heartbeat_interval.is_none());
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            ServerConfig::from_json(r#"{"node_id": "a"}"#),
            Err(ServerStartError::ConfigParse(_))
        ));
        assert!(matches!(
            ServerConfig::from_file("/definitely/not/here.json"),
            Err(ServerStartError::ConfigRead { .. })
        ));
    }
}
