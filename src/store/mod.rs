//! Document store seam.
//!
//! The lifecycle engine never talks to a database directly; it goes through
//! [`DocumentStore`], which owns persistence, access rules and the change
//! feed. [`sqlite::SqliteStore`] is the bundled implementation.

pub mod sqlite;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use thiserror::Error;

use crate::models::{NewTodo, Role, Todo, TodoId, TodoPatch, TodoStatus, User, UserId};

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Todo {0} not found")]
    NotFound(TodoId),
    #[error("Not allowed to change todo {0}")]
    PermissionDenied(TodoId),
    #[error("Todos can only be created for yourself")]
    ForeignOwner,
    #[error("Todo {id} is {from} and cannot become {to}")]
    InvalidTransition {
        id: TodoId,
        from: TodoStatus,
        to: TodoStatus,
    },
    #[error("Rejected record: {0}")]
    InvalidRecord(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Directory(String),
}

impl StoreError {
    /// Storage-level failures may succeed on a second attempt; rule
    /// rejections never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Sqlite(_) | StoreError::Directory(_))
    }
}

/// Identity on whose behalf a write is made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners may touch their own todos, admins may touch any
    pub fn can_modify(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            role: user.role,
        }
    }
}

/// Result-set selector. Only equality on the owner is supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoQuery {
    All,
    Owner(UserId),
}

impl TodoQuery {
    /// Admins see every todo, everyone else only their own
    pub fn for_user(user: &User) -> Self {
        if user.is_admin() {
            TodoQuery::All
        } else {
            TodoQuery::Owner(user.id.clone())
        }
    }

    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            TodoQuery::All => true,
            TodoQuery::Owner(owner) => &todo.owner == owner,
        }
    }
}

pub trait DocumentStore {
    fn create(&self, requester: &Requester, todo: NewTodo) -> Result<TodoId, StoreError>;

    fn update(&self, requester: &Requester, id: TodoId, patch: TodoPatch) -> Result<(), StoreError>;

    fn delete(&self, requester: &Requester, id: TodoId) -> Result<(), StoreError>;

    /// Current result set of `query`, in insertion order
    fn fetch(&self, query: &TodoQuery) -> Result<Vec<Todo>, StoreError>;

    /// Live result set of `query`. The current snapshot is delivered right
    /// away and again after every change.
    fn subscribe(&self, query: TodoQuery) -> Result<Subscription, StoreError>;

    /// Pick up writes made through other connections. Returns true if
    /// subscribers were sent fresh snapshots.
    fn poll_changes(&self) -> Result<bool, StoreError>;
}

struct Subscriber {
    id: u64,
    query: TodoQuery,
    sender: Sender<Vec<Todo>>,
}

/// Bookkeeping shared by store implementations for their change feeds
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl SubscriberRegistry {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Register `query` and hand back the subscription. The caller is
    /// expected to push the initial snapshot with [`SubscriberRegistry::publish`].
    pub fn register(registry: &Rc<RefCell<Self>>, query: TodoQuery) -> (Subscription, Sender<Vec<Todo>>) {
        let (sender, receiver) = mpsc::channel();
        let mut inner = registry.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        tracing::debug!(subscription = id, ?query, "subscriber registered");
        inner.subscribers.push(Subscriber {
            id,
            query,
            sender: sender.clone(),
        });

        let subscription = Subscription {
            id,
            receiver,
            registry: Rc::downgrade(registry),
        };
        (subscription, sender)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Send every subscriber the result of running its query through
    /// `load`. Subscribers whose receiving end is gone are dropped.
    pub fn publish<F>(&mut self, mut load: F) -> Result<(), StoreError>
    where
        F: FnMut(&TodoQuery) -> Result<Vec<Todo>, StoreError>,
    {
        let mut closed = Vec::new();
        for subscriber in &self.subscribers {
            let snapshot = load(&subscriber.query)?;
            if subscriber.sender.send(snapshot).is_err() {
                closed.push(subscriber.id);
            }
        }
        if !closed.is_empty() {
            self.subscribers.retain(|s| !closed.contains(&s.id));
        }
        Ok(())
    }

    fn remove(&mut self, id: u64) {
        self.subscribers.retain(|s| s.id != id);
        tracing::debug!(subscription = id, "subscriber removed");
    }
}

/// Handle on a live query. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    receiver: Receiver<Vec<Todo>>,
    registry: Weak<RefCell<SubscriberRegistry>>,
}

impl Subscription {
    /// Newest snapshot pushed since the last call, skipping stale ones
    pub fn latest(&self) -> Option<Vec<Todo>> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(snapshot) => latest = Some(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut registry) = registry.try_borrow_mut() {
                registry.remove(self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn todo(id: i64, owner: &str) -> Todo {
        let now = Utc::now();
        Todo {
            id: TodoId(id),
            title: format!("todo {}", id),
            owner: UserId(owner.to_string()),
            created_at: now,
            deadline: now + chrono::Duration::hours(24),
            status: TodoStatus::Active,
        }
    }

    #[test]
    fn requester_rules() {
        let owner = UserId("a".to_string());
        let user = Requester { user_id: owner.clone(), role: Role::User };
        let other = Requester { user_id: UserId("b".to_string()), role: Role::User };
        let admin = Requester { user_id: UserId("c".to_string()), role: Role::Admin };
        assert!(user.can_modify(&owner));
        assert!(!other.can_modify(&owner));
        assert!(admin.can_modify(&owner));
    }

    #[test]
    fn owner_query_matches_only_owner() {
        let query = TodoQuery::Owner(UserId("a".to_string()));
        assert!(query.matches(&todo(1, "a")));
        assert!(!query.matches(&todo(2, "b")));
        assert!(TodoQuery::All.matches(&todo(2, "b")));
    }

    #[test]
    fn publish_filters_per_subscriber_and_drop_unsubscribes() {
        let registry = SubscriberRegistry::new();
        let all = vec![todo(1, "a"), todo(2, "b")];
        let (mine, _) = SubscriberRegistry::register(&registry, TodoQuery::Owner(UserId("a".to_string())));
        let (everything, _) = SubscriberRegistry::register(&registry, TodoQuery::All);

        registry
            .borrow_mut()
            .publish(|q| Ok(all.iter().filter(|t| q.matches(t)).cloned().collect()))
            .unwrap();

        assert_eq!(mine.latest().unwrap().len(), 1);
        assert_eq!(everything.latest().unwrap().len(), 2);
        assert!(mine.latest().is_none());

        drop(mine);
        assert_eq!(registry.borrow().len(), 1);
    }

    #[test]
    fn latest_skips_stale_snapshots() {
        let registry = SubscriberRegistry::new();
        let (sub, sender) = SubscriberRegistry::register(&registry, TodoQuery::All);
        sender.send(vec![todo(1, "a")]).unwrap();
        sender.send(vec![todo(1, "a"), todo(2, "a")]).unwrap();
        assert_eq!(sub.latest().unwrap().len(), 2);
    }
}
