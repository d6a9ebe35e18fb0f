use crate::commitlog::Sequence;
use crate::store::{ApplyOutcome, Operation};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
    pub online: bool,
    pub session_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}

/// StateStore holds accounts and inboxes. It is a pure function of the applied log: `apply()` is
/// the only mutator, and it is only called by the replica actor in sequence order.
///
/// Handles are cheap to clone. Queries take a read lock and may run concurrently with each other,
/// never with an `apply()`.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<StoreData>>,
}

#[derive(Default)]
struct StoreData {
    accounts: BTreeMap<String, Account>,
    // recipient -> messages, oldest first
    inboxes: BTreeMap<String, VecDeque<Message>>,
    // Every message id ever applied, including ones since removed by a read. Keeps a retried send
    // from coming back to life.
    message_ids: BTreeSet<String>,
    // username -> (request id, messages) of that user's latest destructive read.
    last_reads: BTreeMap<String, (String, Vec<Message>)>,
    last_applied: Option<Sequence>,
}

/// Full copy of the store contents, for comparing two stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub accounts: Vec<Account>,
    pub messages: Vec<Message>,
    pub message_ids: Vec<String>,
    pub last_applied: Option<Sequence>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the operation of the entry at `sequence`. Applying a sequence at or below the last
    /// applied one is a no-op.
    pub fn apply(&self, sequence: Sequence, origin_timestamp: DateTime<Utc>, operation: &Operation) -> ApplyOutcome {
        let mut data = self.write();
        if matches!(data.last_applied, Some(last) if sequence <= last) {
            return ApplyOutcome::AlreadyApplied;
        }
        data.last_applied = Some(sequence);

        data.apply_operation(origin_timestamp, operation)
    }

    pub fn last_applied(&self) -> Option<Sequence> {
        self.read().last_applied
    }

    pub fn account_exists(&self, username: &str) -> bool {
        self.read().accounts.contains_key(username)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.read()
            .accounts
            .get(username)
            .map(|account| account.online)
            .unwrap_or(false)
    }

    pub fn verify_credentials(&self, username: &str, password_hash: &str) -> bool {
        self.read()
            .accounts
            .get(username)
            .map(|account| account.password_hash == password_hash)
            .unwrap_or(false)
    }

    /// True if `session_token` is the live session of `username`.
    pub fn session_matches(&self, username: &str, session_token: &str) -> bool {
        self.read()
            .accounts
            .get(username)
            .and_then(|account| account.session_token.as_deref())
            .map(|token| token == session_token)
            .unwrap_or(false)
    }

    pub fn contains_message(&self, message_id: &str) -> bool {
        self.read().message_ids.contains(message_id)
    }

    pub fn inbox(&self, username: &str) -> Vec<Message> {
        self.read()
            .inboxes
            .get(username)
            .map(|inbox| inbox.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Online usernames containing `pattern`. Empty, `*` and `all` match everyone.
    pub fn online_users(&self, pattern: &str) -> Vec<String> {
        let match_all = pattern.is_empty() || pattern == "*" || pattern == "all";
        self.read()
            .accounts
            .values()
            .filter(|account| account.online)
            .filter(|account| match_all || account.username.contains(pattern))
            .map(|account| account.username.clone())
            .collect()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let data = self.read();
        StoreSnapshot {
            accounts: data.accounts.values().cloned().collect(),
            messages: data.inboxes.values().flat_map(|inbox| inbox.iter().cloned()).collect(),
            message_ids: data.message_ids.iter().cloned().collect(),
            last_applied: data.last_applied,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreData> {
        self.inner.read().expect("StateStore lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreData> {
        self.inner.write().expect("StateStore lock poisoned")
    }
}

impl StoreData {
    fn apply_operation(&mut self, origin_timestamp: DateTime<Utc>, operation: &Operation) -> ApplyOutcome {
        match operation {
            Operation::CreateAccount {
                username,
                password_hash,
            } => {
                if self.accounts.contains_key(username) {
                    return ApplyOutcome::Rejected("Username already exists".into());
                }
                self.accounts.insert(
                    username.clone(),
                    Account {
                        username: username.clone(),
                        password_hash: password_hash.clone(),
                        online: false,
                        session_token: None,
                    },
                );
                ApplyOutcome::Applied
            }
            Operation::DeleteAccount { username } => {
                if self.accounts.remove(username).is_none() {
                    return ApplyOutcome::Rejected("User does not exist".into());
                }
                // Messages this user sent to others stay in their inboxes.
                self.inboxes.remove(username);
                self.last_reads.remove(username);
                ApplyOutcome::Applied
            }
            Operation::Login {
                username,
                session_token,
            } => match self.accounts.get_mut(username) {
                Some(account) => {
                    account.online = true;
                    account.session_token = Some(session_token.clone());
                    ApplyOutcome::Applied
                }
                None => ApplyOutcome::Rejected("User does not exist".into()),
            },
            Operation::Logout {
                username,
                session_token,
            } => match self.accounts.get_mut(username) {
                Some(account) => {
                    // A superseded session logging out must not end the newer one.
                    if account.session_token.as_deref() == Some(session_token.as_str()) {
                        account.online = false;
                        account.session_token = None;
                    }
                    ApplyOutcome::Applied
                }
                None => ApplyOutcome::Rejected("User does not exist".into()),
            },
            Operation::SendMessage {
                message_id,
                sender,
                recipient,
                body,
            } => {
                if self.message_ids.contains(message_id) {
                    return ApplyOutcome::Applied;
                }
                if !self.accounts.contains_key(recipient) {
                    return ApplyOutcome::Rejected("Recipient does not exist".into());
                }
                self.message_ids.insert(message_id.clone());
                self.inboxes.entry(recipient.clone()).or_default().push_back(Message {
                    id: message_id.clone(),
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    body: body.clone(),
                    created_at: origin_timestamp,
                    delivered: false,
                });
                ApplyOutcome::Applied
            }
            Operation::ReadMessages {
                username,
                limit,
                request_id,
            } => {
                if !self.accounts.contains_key(username) {
                    return ApplyOutcome::Rejected("User does not exist".into());
                }
                let inbox = self.inboxes.entry(username.clone()).or_default();
                if *limit == 0 {
                    inbox.iter_mut().for_each(|m| m.delivered = true);
                    return ApplyOutcome::Messages(inbox.iter().cloned().collect());
                }

                if let (Some(request_id), Some((last_id, last_batch))) =
                    (request_id, self.last_reads.get(username))
                {
                    if request_id == last_id {
                        return ApplyOutcome::Messages(last_batch.clone());
                    }
                }
                let take = std::cmp::min(*limit as usize, inbox.len());
                let messages: Vec<Message> = inbox
                    .drain(..take)
                    .map(|mut m| {
                        m.delivered = true;
                        m
                    })
                    .collect();
                if let Some(request_id) = request_id {
                    self.last_reads
                        .insert(username.clone(), (request_id.clone(), messages.clone()));
                }
                ApplyOutcome::Messages(messages)
            }
            Operation::EpochStart { .. } => {
                for account in self.accounts.values_mut() {
                    account.online = false;
                    account.session_token = None;
                }
                ApplyOutcome::Applied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::hash_password;

    struct Applier {
        store: StateStore,
        next: u64,
    }

    impl Applier {
        fn new() -> Self {
            Applier {
                store: StateStore::new(),
                next: 1,
            }
        }

        fn apply(&mut self, operation: Operation) -> ApplyOutcome {
            let seq = Sequence::new(self.next);
            self.next += 1;
            self.store.apply(seq, Utc::now(), &operation)
        }
    }

    fn create(username: &str) -> Operation {
        Operation::CreateAccount {
            username: username.into(),
            password_hash: hash_password(username, "pw"),
        }
    }

    fn send(id: &str, from: &str, to: &str, body: &str) -> Operation {
        Operation::SendMessage {
            message_id: id.into(),
            sender: from.into(),
            recipient: to.into(),
            body: body.into(),
        }
    }

    fn read(username: &str, limit: u32) -> Operation {
        Operation::ReadMessages {
            username: username.into(),
            limit,
            request_id: None,
        }
    }

    fn read_with_id(username: &str, limit: u32, request_id: &str) -> Operation {
        Operation::ReadMessages {
            username: username.into(),
            limit,
            request_id: Some(request_id.into()),
        }
    }

    fn bodies(outcome: ApplyOutcome) -> Vec<String> {
        match outcome {
            ApplyOutcome::Messages(messages) => messages.into_iter().map(|m| m.body).collect(),
            other => panic!("Expected messages, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let mut a = Applier::new();
        assert_eq!(a.apply(create("alice")), ApplyOutcome::Applied);
        assert!(matches!(a.apply(create("alice")), ApplyOutcome::Rejected(_)));
        assert_eq!(a.store.snapshot().accounts.len(), 1);
        assert!(a.store.verify_credentials("alice", &hash_password("alice", "pw")));
        assert!(!a.store.verify_credentials("alice", &hash_password("alice", "nope")));
    }

    #[test]
    fn history_is_kept_until_a_destructive_read() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("bob"));
        a.apply(send("m1", "alice", "bob", "hi"));

        assert_eq!(bodies(a.apply(read("bob", 0))), vec!["hi"]);
        assert_eq!(bodies(a.apply(read("bob", 0))), vec!["hi"]);
        assert!(a.store.inbox("bob")[0].delivered);

        assert_eq!(bodies(a.apply(read("bob", 1))), vec!["hi"]);
        assert!(bodies(a.apply(read("bob", 0))).is_empty());
    }

    #[test]
    fn positive_limit_removes_oldest_first() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("bob"));
        for i in 0..4 {
            a.apply(send(&format!("m{}", i), "alice", "bob", &format!("msg{}", i)));
        }

        assert_eq!(bodies(a.apply(read("bob", 3))), vec!["msg0", "msg1", "msg2"]);
        assert_eq!(bodies(a.apply(read("bob", 10))), vec!["msg3"]);
    }

    #[test]
    fn resent_message_id_is_not_duplicated() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("bob"));
        a.apply(send("m1", "alice", "bob", "hi"));
        assert_eq!(a.apply(send("m1", "alice", "bob", "hi")), ApplyOutcome::Applied);
        assert_eq!(a.store.inbox("bob").len(), 1);

        // Even after the message was consumed.
        a.apply(read("bob", 1));
        a.apply(send("m1", "alice", "bob", "hi"));
        assert!(a.store.inbox("bob").is_empty());
    }

    #[test]
    fn retried_read_returns_the_same_batch() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("bob"));
        for i in 0..3 {
            a.apply(send(&format!("m{}", i), "alice", "bob", &format!("msg{}", i)));
        }

        // The first attempt timed out on the client but still committed.
        assert_eq!(bodies(a.apply(read_with_id("bob", 1, "r1"))), vec!["msg0"]);
        assert_eq!(bodies(a.apply(read_with_id("bob", 1, "r1"))), vec!["msg0"]);
        assert_eq!(a.store.inbox("bob").len(), 2);

        assert_eq!(bodies(a.apply(read_with_id("bob", 1, "r2"))), vec!["msg1"]);
        assert_eq!(bodies(a.apply(read("bob", 0))), vec!["msg2"]);
    }

    #[test]
    fn send_to_unknown_recipient_is_rejected() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        assert!(matches!(a.apply(send("m1", "alice", "nobody", "hi")), ApplyOutcome::Rejected(_)));
        assert!(!a.store.contains_message("m1"));
    }

    #[test]
    fn sessions() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("alicia"));
        a.apply(create("bob"));
        a.apply(Operation::Login {
            username: "alice".into(),
            session_token: "t1".into(),
        });
        a.apply(Operation::Login {
            username: "alicia".into(),
            session_token: "t2".into(),
        });
        assert!(a.store.is_online("alice"));
        assert!(a.store.session_matches("alice", "t1"));
        assert_eq!(a.store.online_users(""), vec!["alice", "alicia"]);
        assert_eq!(a.store.online_users("ici"), vec!["alicia"]);

        // Re-login supersedes, and the old session's logout is ignored.
        a.apply(Operation::Login {
            username: "alice".into(),
            session_token: "t3".into(),
        });
        a.apply(Operation::Logout {
            username: "alice".into(),
            session_token: "t1".into(),
        });
        assert!(a.store.session_matches("alice", "t3"));

        a.apply(Operation::EpochStart {
            primary_id: "node-2".into(),
        });
        assert!(a.store.online_users("").is_empty());
        assert!(!a.store.session_matches("alice", "t3"));
    }

    #[test]
    fn delete_keeps_messages_sent_to_others() {
        let mut a = Applier::new();
        a.apply(create("alice"));
        a.apply(create("bob"));
        a.apply(send("m1", "alice", "bob", "hi"));
        a.apply(send("m2", "bob", "alice", "yo"));
        a.apply(Operation::DeleteAccount {
            username: "alice".into(),
        });

        assert!(!a.store.account_exists("alice"));
        assert!(a.store.inbox("alice").is_empty());
        assert_eq!(a.store.inbox("bob").len(), 1);
    }

    #[test]
    fn replay_is_idempotent() {
        let ts = Utc::now();
        let ops = vec![
            create("alice"),
            create("bob"),
            send("m1", "alice", "bob", "hi"),
            send("m2", "alice", "bob", "there"),
            read("bob", 0),
            read("bob", 1),
            Operation::Login {
                username: "bob".into(),
                session_token: "t".into(),
            },
        ];
        let replay = |store: &StateStore| {
            for (i, op) in ops.iter().enumerate() {
                store.apply(Sequence::new_usize(i + 1), ts, op);
            }
        };

        let first = StateStore::new();
        replay(&first);
        let after_one = first.snapshot();
        replay(&first);
        assert_eq!(after_one, first.snapshot());

        let second = StateStore::new();
        replay(&second);
        assert_eq!(after_one, second.snapshot());
        assert_eq!(after_one.messages.len(), 1);
    }
}
