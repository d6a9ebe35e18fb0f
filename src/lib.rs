mod actor;
mod api;
mod client;
mod commitlog;
mod frontend;
mod processor;
mod replica;
mod server;
mod store;
mod wire;
mod grpc {
    include!("../generated/replication.rs");
}

pub use api::try_start_server;
pub use api::BackupEventData;
pub use api::ChatServerHandle;
pub use api::PeerConfig;
pub use api::ReplicationOptions;
pub use api::RoleEvent;
pub use api::RoleEventListener;
pub use api::ServerConfig;
pub use api::ServerStartError;
pub use client::ClientError;
pub use client::CommandOutcome;
pub use client::FailoverClient;
pub use client::FailoverOptions;
pub use processor::CommandError;
pub use store::Account;
pub use store::Message;
pub use store::StoreSnapshot;
pub use wire::CodecKind;
pub use wire::DecodeError;
pub use wire::EncodeError;
pub use wire::FrameError;
pub use wire::MessageCodec;
pub use wire::WireMessage;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
