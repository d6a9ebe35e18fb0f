use crate::commitlog;
use crate::replica;
use crate::server::ShutdownSignal;
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

// Disk interaction is synchronous inside the actor. Everything else that may block (peer RPCs,
// timers) runs in spawned tasks and reports back as an event.
#[derive(Debug)]
pub(crate) enum Event {
    // Primary: Write to disk, replicate, reply once committed and applied.
    // Primary (syncing): Defer until sync completes.
    // Candidate/Backup: Redirect.
    Propose(
        replica::ProposeInput,
        Callback<replica::ProposeOutput, replica::ProposeError>,
    ),

    // Any: Grant vote if applicable (includes write to disk). Step down on higher epoch.
    RequestVote(
        replica::RequestVoteInput,
        Callback<replica::RequestVoteOutput, replica::RequestVoteError>,
    ),
    // Backup: Reset timeout, move commit point.
    // Candidate: Concede.
    Heartbeat(
        replica::HeartbeatInput,
        Callback<replica::HeartbeatOutput, replica::HeartbeatError>,
    ),
    // Backup: Write to disk then respond. Reset timeout.
    // Primary/Candidate: Step down if applicable, then as Backup.
    AppendEntries(
        replica::AppendEntriesInput,
        Callback<replica::AppendEntriesOutput, replica::AppendEntriesError>,
    ),
    // Any: Return entries past the requested sequence.
    RequestSync(
        replica::RequestSyncInput,
        Callback<replica::RequestSyncOutput, replica::RequestSyncError>,
    ),

    // Candidate: Count vote, become primary on quorum.
    RequestVoteReplyFromPeer(replica::RequestVoteReplyFromPeer),
    // Primary: Track peer progress, commit and apply on quorum.
    AppendEntriesReplyFromPeer(replica::AppendEntriesReplyFromPeer),
    // Primary (syncing): Collect, finish sync once every peer answered.
    SyncReplyFromPeer(replica::SyncReplyFromPeer),
    // Primary (syncing): Stop waiting for peers that haven't answered.
    SyncTimeout(replica::Epoch),

    // Primary: Send Heartbeat (syncing) or AppendEntries to one peer.
    HeartbeatTimer(replica::HeartbeatTick),
    // Backup/Candidate: Start a new election.
    ElectionTimeout,
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub(crate) fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Result<O, E>>) {
        let (tx, rx) = oneshot::channel();
        (Callback(tx), rx)
    }
}

/// ActorClient keeps the replica actor alive. Held by the command processor.
#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

/// WeakActorClient doesn't keep the actor alive. Held by anything the actor itself owns (timers,
/// RPC tasks) and by the replication server, so dropping the last ActorClient stops the actor.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl ActorClient {
    pub(crate) fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn propose(
        &self,
        input: replica::ProposeInput,
    ) -> Result<replica::ProposeOutput, replica::ProposeError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Event::Propose(input, Callback(tx)))
            .await
            .map_err(|_| replica::ProposeError::ActorExited)?;

        rx.await.map_err(|_| replica::ProposeError::ActorExited)?
    }
}

impl WeakActorClient {
    pub(crate) async fn request_vote(
        &self,
        input: replica::RequestVoteInput,
    ) -> Result<replica::RequestVoteOutput, replica::RequestVoteError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::RequestVote(input, Callback(tx)))
            .await
            .map_err(|_| replica::RequestVoteError::ActorExited)?;

        rx.await.map_err(|_| replica::RequestVoteError::ActorExited)?
    }

    pub(crate) async fn heartbeat(
        &self,
        input: replica::HeartbeatInput,
    ) -> Result<replica::HeartbeatOutput, replica::HeartbeatError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Heartbeat(input, Callback(tx)))
            .await
            .map_err(|_| replica::HeartbeatError::ActorExited)?;

        rx.await.map_err(|_| replica::HeartbeatError::ActorExited)?
    }

    pub(crate) async fn append_entries(
        &self,
        input: replica::AppendEntriesInput,
    ) -> Result<replica::AppendEntriesOutput, replica::AppendEntriesError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::AppendEntries(input, Callback(tx)))
            .await
            .map_err(|_| replica::AppendEntriesError::ActorExited)?;

        rx.await.map_err(|_| replica::AppendEntriesError::ActorExited)?
    }

    pub(crate) async fn request_sync(
        &self,
        input: replica::RequestSyncInput,
    ) -> Result<replica::RequestSyncOutput, replica::RequestSyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::RequestSync(input, Callback(tx)))
            .await
            .map_err(|_| replica::RequestSyncError::ActorExited)?;

        rx.await.map_err(|_| replica::RequestSyncError::ActorExited)?
    }

    pub(crate) async fn notify_request_vote_reply_from_peer(&self, input: replica::RequestVoteReplyFromPeer) {
        let _ = self.send(Event::RequestVoteReplyFromPeer(input)).await;
    }

    pub(crate) async fn notify_append_entries_reply_from_peer(&self, input: replica::AppendEntriesReplyFromPeer) {
        let _ = self.send(Event::AppendEntriesReplyFromPeer(input)).await;
    }

    pub(crate) async fn notify_sync_reply_from_peer(&self, input: replica::SyncReplyFromPeer) {
        let _ = self.send(Event::SyncReplyFromPeer(input)).await;
    }

    pub(crate) async fn sync_timeout(&self, epoch: replica::Epoch) {
        let _ = self.send(Event::SyncTimeout(epoch)).await;
    }

    pub(crate) async fn heartbeat_timer(&self, tick: replica::HeartbeatTick) -> Result<(), ActorExited> {
        self.send(Event::HeartbeatTimer(tick)).await
    }

    pub(crate) async fn election_timeout(&self) -> Result<(), ActorExited> {
        self.send(Event::ElectionTimeout).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        match self.sender.upgrade() {
            Some(sender) => sender.send(event).await.map_err(|_| ActorExited),
            None => Err(ActorExited),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Replica actor has exited")]
pub(crate) struct ActorExited;

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L, S>
where
    L: commitlog::Log<replica::LogEntry>,
    S: replica::PersistentLocalState,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: replica::Replica<L, S>,
}

impl<L, S> ReplicaActor<L, S>
where
    L: commitlog::Log<replica::LogEntry> + 'static,
    S: replica::PersistentLocalState + 'static,
{
    pub(crate) fn new(logger: slog::Logger, receiver: mpsc::Receiver<Event>, replica: replica::Replica<L, S>) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
        }
    }

    pub(crate) async fn run_event_loop(mut self, mut shutdown: ShutdownSignal) {
        slog::info!(self.logger, "Replica actor started");
        self.replica.start();

        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }

        slog::info!(self.logger, "Replica actor exited");
    }

    // This must NOT be async. Any long running work must be spawned on another task and/or come
    // as a callback to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Propose(input, callback) => {
                // The replica holds on to the callback until the entry commits.
                self.replica.handle_propose(input, callback);
            }
            Event::RequestVote(input, callback) => {
                let result = self.replica.server_handle_request_vote(input);
                callback.send(result);
            }
            Event::Heartbeat(input, callback) => {
                let result = self.replica.server_handle_heartbeat(input);
                callback.send(result);
            }
            Event::AppendEntries(input, callback) => {
                let result = self.replica.server_handle_append_entries(input);
                callback.send(result);
            }
            Event::RequestSync(input, callback) => {
                let result = self.replica.server_handle_request_sync(input);
                callback.send(result);
            }
            Event::RequestVoteReplyFromPeer(reply) => {
                self.replica.handle_request_vote_reply_from_peer(reply);
            }
            Event::AppendEntriesReplyFromPeer(reply) => {
                self.replica.handle_append_entries_reply_from_peer(reply);
            }
            Event::SyncReplyFromPeer(reply) => {
                self.replica.handle_sync_reply_from_peer(reply);
            }
            Event::SyncTimeout(epoch) => {
                self.replica.handle_sync_timeout(epoch);
            }
            Event::HeartbeatTimer(tick) => {
                self.replica.handle_heartbeat_timer(tick);
            }
            Event::ElectionTimeout => {
                self.replica.handle_election_timeout();
            }
        }
    }
}
