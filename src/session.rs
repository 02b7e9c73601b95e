use chrono::{DateTime, Duration, Utc};
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::AppError;
use crate::lifecycle::TodoEngine;
use crate::models::{TodoId, User};
use crate::store::{DocumentStore, Requester, Subscription, TodoQuery};

/// Everything tied to one signed-in user: the live store subscription, the
/// engine holding its snapshot, and the expiry timer. Dropping or ending
/// the session releases all of it.
pub struct Session {
    user: User,
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    engine: TodoEngine,
    subscription: Subscription,
    sweep_interval: Duration,
    last_sweep: DateTime<Utc>,
    startup_error: Option<AppError>,
}

impl Session {
    pub fn start(
        store: Rc<dyn DocumentStore>,
        clock: Rc<dyn Clock>,
        user: User,
        sweep_interval: Duration,
    ) -> Result<Self, AppError> {
        let query = TodoQuery::for_user(&user);
        let subscription = store.subscribe(query.clone())?;
        let mut engine = TodoEngine::new(store.clone(), clock.clone(), Requester::from(&user));
        engine.apply_snapshot(subscription.latest().unwrap_or_default());
        tracing::info!(user = %user.id, ?query, todos = engine.todos().len(), "session started");

        let now = clock.now();
        let mut session = Self {
            user,
            store,
            clock,
            engine,
            subscription,
            sweep_interval,
            last_sweep: now,
            startup_error: None,
        };

        // Anything that expired while nobody was watching
        if let Err(e) = session.engine.sweep_at(now) {
            tracing::warn!(error = %e, "initial sweep failed");
            session.startup_error = Some(e);
        }
        Ok(session)
    }

    /// Error from the sweep run by `start`, handed out once
    pub fn take_startup_error(&mut self) -> Option<AppError> {
        self.startup_error.take()
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn engine(&self) -> &TodoEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TodoEngine {
        &mut self.engine
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply the newest snapshot from the store. Returns true if the
    /// visible list was replaced.
    pub fn pump(&mut self) -> Result<bool, AppError> {
        self.store.poll_changes()?;
        match self.subscription.latest() {
            Some(snapshot) => {
                self.engine.apply_snapshot(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Sweep if a deadline has passed or the fallback interval elapsed
    pub fn tick(&mut self) -> Result<Vec<TodoId>, AppError> {
        let now = self.clock.now();
        let fallback_due = now - self.last_sweep >= self.sweep_interval;
        if !self.engine.has_due_deadline() && !fallback_due {
            return Ok(Vec::new());
        }
        self.last_sweep = now;
        self.engine.sweep_at(now)
    }

    /// How long the caller may wait before the next `tick` has work,
    /// capped at `max`
    pub fn next_wake(&self, max: std::time::Duration) -> std::time::Duration {
        let now = self.clock.now();
        let mut wake = self
            .last_sweep
            .checked_add_signed(self.sweep_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(deadline) = self.engine.next_deadline() {
            wake = wake.min(deadline);
        }
        let until = (wake - now).to_std().unwrap_or(std::time::Duration::ZERO);
        until.min(max)
    }

    /// Stop the timer and unsubscribe from the store
    pub fn end(self) {
        tracing::info!(user = %self.user.id, "session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Role, TodoStatus, UserId};
    use crate::store::{SqliteStore, StoreError};

    fn user(id: &str, role: Role) -> User {
        User {
            id: UserId(id.to_string()),
            email: format!("{}@gmail.com", id),
            display_name: None,
            role,
            created_at: Utc::now(),
        }
    }

    fn start_clock() -> ManualClock {
        ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    #[test]
    fn next_wake_tracks_nearest_deadline() {
        let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
        let clock = start_clock();
        let mut session = Session::start(
            store,
            Rc::new(clock.clone()),
            user("ann", Role::User),
            Duration::hours(48),
        )
        .unwrap();

        let cap = std::time::Duration::from_secs(7 * 24 * 3600);
        assert_eq!(session.next_wake(cap), std::time::Duration::from_secs(48 * 3600));

        session.engine_mut().create("Buy milk").unwrap();
        assert_eq!(session.next_wake(cap), std::time::Duration::from_secs(24 * 3600));

        clock.advance(Duration::hours(25));
        assert_eq!(session.next_wake(cap), std::time::Duration::ZERO);
        assert_eq!(session.next_wake(std::time::Duration::from_millis(250)), std::time::Duration::ZERO);
    }

    #[test]
    fn tick_sweeps_only_when_due() {
        let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
        let clock = start_clock();
        let mut session = Session::start(
            store,
            Rc::new(clock.clone()),
            user("ann", Role::User),
            Duration::seconds(60),
        )
        .unwrap();
        let id = session.engine_mut().create("Buy milk").unwrap();

        clock.advance(Duration::hours(23));
        assert!(session.tick().unwrap().is_empty());

        clock.advance(Duration::hours(1) + Duration::seconds(1));
        assert_eq!(session.tick().unwrap(), vec![id]);
        assert!(session.pump().unwrap());
        assert_eq!(session.engine().get(id).unwrap().status, TodoStatus::Missed);
    }

    /// Store whose status writes always fail
    struct ReadOnlyStore(SqliteStore);

    impl DocumentStore for ReadOnlyStore {
        fn create(&self, requester: &Requester, todo: crate::models::NewTodo) -> Result<TodoId, StoreError> {
            self.0.create(requester, todo)
        }

        fn update(&self, _: &Requester, _: TodoId, _: crate::models::TodoPatch) -> Result<(), StoreError> {
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }

        fn delete(&self, requester: &Requester, id: TodoId) -> Result<(), StoreError> {
            self.0.delete(requester, id)
        }

        fn fetch(&self, query: &TodoQuery) -> Result<Vec<crate::models::Todo>, StoreError> {
            self.0.fetch(query)
        }

        fn subscribe(&self, query: TodoQuery) -> Result<Subscription, StoreError> {
            self.0.subscribe(query)
        }

        fn poll_changes(&self) -> Result<bool, StoreError> {
            self.0.poll_changes()
        }
    }

    #[test]
    fn failed_startup_sweep_is_reported_once() {
        let store: Rc<dyn DocumentStore> = Rc::new(ReadOnlyStore(SqliteStore::open_in_memory().unwrap()));
        let clock = start_clock();
        let ann = user("ann", Role::User);
        let mut engine = TodoEngine::new(store.clone(), Rc::new(clock.clone()), Requester::from(&ann));
        engine.create("Buy milk").unwrap();

        clock.advance(Duration::hours(25));
        let mut session = Session::start(store, Rc::new(clock.clone()), ann, Duration::seconds(60)).unwrap();
        let error = session.take_startup_error().unwrap();
        assert!(error.is_retryable());
        assert!(session.take_startup_error().is_none());
    }

    #[test]
    fn huge_sweep_interval_does_not_overflow() {
        let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
        let session = Session::start(
            store,
            Rc::new(start_clock()),
            user("ann", Role::User),
            Duration::MAX,
        )
        .unwrap();
        let cap = std::time::Duration::from_millis(250);
        assert_eq!(session.next_wake(cap), cap);
    }

    #[test]
    fn sessions_see_their_own_scope() {
        let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
        let clock: Rc<dyn Clock> = Rc::new(start_clock());
        let mut admin = Session::start(store.clone(), clock.clone(), user("root", Role::Admin), Duration::seconds(60)).unwrap();
        let mut ann = Session::start(store.clone(), clock.clone(), user("ann", Role::User), Duration::seconds(60)).unwrap();

        admin.engine_mut().create("admin chore").unwrap();
        ann.engine_mut().create("ann chore").unwrap();

        admin.pump().unwrap();
        ann.pump().unwrap();
        assert_eq!(admin.engine().todos().len(), 2);
        assert_eq!(ann.engine().todos().len(), 1);
        assert_eq!(ann.engine().todos()[0].title, "ann chore");
    }
}
