mod command_processor;
mod error;
mod session;

pub(crate) use command_processor::CommandProcessor;
pub(crate) use command_processor::Connection;
pub use error::CommandError;
pub(crate) use session::SessionRegistry;
