use crate::wire::WireMessage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub(crate) type ConnectionId = u64;

/// SessionRegistry maps logged in users to the connection that pushes to them. One entry per
/// user; the newest login wins.
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, (ConnectionId, mpsc::UnboundedSender<WireMessage>)>>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, username: &str, connection_id: ConnectionId, outbound: mpsc::UnboundedSender<WireMessage>) {
        self.inner
            .lock()
            .expect("SessionRegistry lock poisoned")
            .insert(username.to_string(), (connection_id, outbound));
    }

    /// Only removes the entry if it still belongs to `connection_id`.
    pub(crate) fn unregister(&self, username: &str, connection_id: ConnectionId) {
        let mut sessions = self.inner.lock().expect("SessionRegistry lock poisoned");
        if matches!(sessions.get(username), Some((owner, _)) if *owner == connection_id) {
            sessions.remove(username);
        }
    }

    /// Returns true if the message was handed to a live connection.
    pub(crate) fn push(&self, username: &str, message: WireMessage) -> bool {
        let sessions = self.inner.lock().expect("SessionRegistry lock poisoned");
        match sessions.get(username) {
            Some((_, outbound)) => outbound.send(message).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_connection_owns_the_user() {
        let registry = SessionRegistry::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        registry.register("alice", 1, old_tx);
        registry.register("alice", 2, new_tx);
        // Old connection closing doesn't unregister the new one.
        registry.unregister("alice", 1);

        assert!(registry.push("alice", WireMessage::new("deliver")));
        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap().cmd, "deliver");

        registry.unregister("alice", 2);
        assert!(!registry.push("alice", WireMessage::new("deliver")));
        assert!(!registry.push("bob", WireMessage::new("deliver")));
    }
}
