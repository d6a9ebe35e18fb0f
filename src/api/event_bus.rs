use crate::replica::ElectionStateChangeListener;
use crate::replica::ElectionStateSnapshot;
use std::net::SocketAddr;

/// Role of the local server, as seen by its replica.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoleEvent {
    Primary,
    /// Elected, catching up from peers before serving clients.
    PrimarySyncing,
    Candidate,
    Backup(BackupEventData),
    BackupNoPrimary,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupEventData {
    pub primary_id: String,
    pub primary_client_addr: Option<SocketAddr>,
}

/// Consuming this is subtle. It doesn't queue intermediate roles. If the role changes several times
/// between two `next_event()` calls, only the most recent one is seen.
#[derive(Clone)]
pub struct RoleEventListener {
    election_state_change_listener: ElectionStateChangeListener,
}

impl RoleEventListener {
    pub(crate) fn new(election_state_change_listener: ElectionStateChangeListener) -> Self {
        RoleEventListener {
            election_state_change_listener,
        }
    }

    pub fn current(&self) -> RoleEvent {
        RoleEvent::from(self.election_state_change_listener.current())
    }

    /// Waits for the next role change. `None` once the server has stopped.
    pub async fn next_event(&mut self) -> Option<RoleEvent> {
        self.election_state_change_listener
            .next()
            .await
            .map(RoleEvent::from)
    }
}

impl From<ElectionStateSnapshot> for RoleEvent {
    fn from(election_state: ElectionStateSnapshot) -> Self {
        match election_state {
            ElectionStateSnapshot::Primary => RoleEvent::Primary,
            ElectionStateSnapshot::PrimarySyncing => RoleEvent::PrimarySyncing,
            ElectionStateSnapshot::Candidate => RoleEvent::Candidate,
            ElectionStateSnapshot::Backup(hint) => RoleEvent::Backup(BackupEventData {
                primary_id: hint.replica_id.into_inner(),
                primary_client_addr: hint.client_addr,
            }),
            ElectionStateSnapshot::BackupNoPrimary => RoleEvent::BackupNoPrimary,
        }
    }
}
