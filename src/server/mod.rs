mod server;
mod shutdown;

pub(crate) use server::RpcServer;
pub use shutdown::shutdown_signal;
pub use shutdown::ShutdownHandle;
pub use shutdown::ShutdownSignal;
