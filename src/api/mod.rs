//! Public surface for running a server: configuration, bootstrap and role events.
mod config;
mod event_bus;
mod options;
mod wiring;

pub use config::PeerConfig;
pub use config::ServerConfig;
pub use event_bus::BackupEventData;
pub use event_bus::RoleEvent;
pub use event_bus::RoleEventListener;
pub use options::ReplicationOptions;
pub use wiring::try_start_server;
pub use wiring::ChatServerHandle;
pub use wiring::ServerStartError;
