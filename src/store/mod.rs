mod operation;
mod password;
mod state_store;

pub use operation::ApplyOutcome;
pub use operation::Operation;
pub use password::hash_password;
pub use state_store::Account;
pub use state_store::Message;
pub use state_store::StateStore;
pub use state_store::StoreSnapshot;
