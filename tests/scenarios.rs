use chrono::{DateTime, Duration, Utc};
use std::rc::Rc;

use daylist::auth::{AuthProvider, EmailPolicy, LocalAuth};
use daylist::clock::ManualClock;
use daylist::error::{AppError, ValidationError};
use daylist::lifecycle::{filter, sweep_expired, time_remaining, Outcome, TimeRemaining, TodoEngine};
use daylist::models::{Role, StatusFilter, TodoStatus, User, UserId};
use daylist::store::{DocumentStore, Requester, SqliteStore, StoreError, TodoQuery};
use daylist::Session;

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn engine_for(store: &Rc<dyn DocumentStore>, clock: &ManualClock, user: &str, role: Role) -> TodoEngine {
    let requester = Requester {
        user_id: UserId(user.to_string()),
        role,
    };
    TodoEngine::new(store.clone(), Rc::new(clock.clone()), requester)
}

#[test]
fn buy_milk_becomes_missed_after_its_deadline() {
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
    let clock = ManualClock::new(t0());
    let mut engine = engine_for(&store, &clock, "ann", Role::User);

    let id = engine.create("Buy milk").unwrap();
    let todo = engine.get(id).unwrap();
    assert_eq!(todo.status, TodoStatus::Active);
    assert_eq!(todo.deadline, t0() + Duration::hours(24));

    clock.set(t0() + Duration::hours(24) + Duration::seconds(1));
    assert_eq!(engine.sweep().unwrap(), vec![id]);
    assert_eq!(engine.get(id).unwrap().status, TodoStatus::Missed);

    let stored = store.fetch(&TodoQuery::All).unwrap();
    assert_eq!(stored[0].status, TodoStatus::Missed);
}

#[test]
fn completed_todo_stays_completed_after_deadline() {
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
    let clock = ManualClock::new(t0());
    let mut engine = engine_for(&store, &clock, "ann", Role::User);

    let id = engine.create("Call mom").unwrap();
    assert_eq!(engine.complete(id).unwrap(), Outcome::Changed);

    clock.advance(Duration::hours(30));
    assert!(engine.sweep().unwrap().is_empty());
    assert_eq!(engine.get(id).unwrap().status, TodoStatus::Completed);
    assert_eq!(store.fetch(&TodoQuery::All).unwrap()[0].status, TodoStatus::Completed);
}

#[test]
fn empty_title_is_rejected_without_a_record() {
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
    let clock = ManualClock::new(t0());
    let mut engine = engine_for(&store, &clock, "ann", Role::User);

    for title in ["", "   "] {
        let err = engine.create(title).unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::EmptyTitle)));
    }
    assert!(engine.todos().is_empty());
    assert!(store.fetch(&TodoQuery::All).unwrap().is_empty());
}

#[test]
fn first_user_is_admin_and_sees_every_todo() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("daylist.db");
    let db = db.to_str().unwrap();

    let auth = LocalAuth::open(db, EmailPolicy::default()).unwrap();
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
    let clock = ManualClock::new(t0());

    let admin = auth.sign_up("root@gmail.com", "secret1", Some("Root")).unwrap();
    let user = auth.sign_up("ann@gmail.com", "secret1", None).unwrap();
    assert_eq!(admin.role, Role::Admin);
    assert_eq!(user.role, Role::User);

    let start = |u: &User| Session::start(store.clone(), Rc::new(clock.clone()), u.clone(), Duration::seconds(60)).unwrap();
    let mut admin_session = start(&admin);
    let mut user_session = start(&user);

    admin_session.engine_mut().create("Admin chore").unwrap();
    let ann_todo = user_session.engine_mut().create("Ann chore").unwrap();
    admin_session.pump().unwrap();
    user_session.pump().unwrap();

    let titles = |s: &Session| s.engine().todos().iter().map(|t| t.title.clone()).collect::<Vec<_>>();
    assert_eq!(titles(&admin_session), ["Admin chore", "Ann chore"]);
    assert_eq!(titles(&user_session), ["Ann chore"]);

    // Admins may act on any todo, users only on their own
    let admin_todo = admin_session.engine().todos()[0].id;
    let err = store.delete(&Requester::from(&user), admin_todo).unwrap_err();
    assert!(matches!(err, StoreError::PermissionDenied(_)));
    assert_eq!(admin_session.engine_mut().complete(ann_todo).unwrap(), Outcome::Changed);

    user_session.pump().unwrap();
    assert_eq!(user_session.engine().get(ann_todo).unwrap().status, TodoStatus::Completed);
}

#[test]
fn sweep_and_filter_properties_hold_on_a_mixed_list() {
    let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open_in_memory().unwrap());
    let clock = ManualClock::new(t0());
    let mut engine = engine_for(&store, &clock, "ann", Role::User);

    let early = engine.create("early").unwrap();
    clock.advance(Duration::hours(6));
    let done = engine.create("done").unwrap();
    engine.complete(done).unwrap();
    clock.advance(Duration::hours(6));
    let late = engine.create("late").unwrap();

    // Only "early" is past its deadline
    clock.set(t0() + Duration::hours(25));
    let mut snapshot = engine.todos().to_vec();
    let first = sweep_expired(clock_now(&clock), &mut snapshot);
    let again = sweep_expired(clock_now(&clock), &mut snapshot);
    assert_eq!(first, vec![early]);
    assert!(again.is_empty());

    let all = filter(&snapshot, StatusFilter::All);
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![early, done, late]);
    for criterion in [StatusFilter::Active, StatusFilter::Completed, StatusFilter::Missed] {
        let view = filter(&snapshot, criterion);
        assert_eq!(view.len(), 1, "{:?}", criterion);
        assert!(view.iter().all(|t| criterion.matches(t.status)));
    }

    let late_todo = snapshot.iter().find(|t| t.id == late).unwrap();
    assert_eq!(
        time_remaining(late_todo, clock_now(&clock)),
        Some(TimeRemaining::Remaining { hours: 11, minutes: 0 })
    );
    assert_eq!(time_remaining(late_todo, late_todo.deadline), Some(TimeRemaining::Expired));
}

fn clock_now(clock: &ManualClock) -> DateTime<Utc> {
    use daylist::Clock;
    clock.now()
}

#[test]
fn sign_out_notifies_subscribers() {
    let auth = LocalAuth::open_in_memory(EmailPolicy::unrestricted()).unwrap();
    let changes = auth.on_auth_change();
    assert_eq!(changes.latest(), Some(None));

    let user = auth.sign_up("ann@example.com", "secret1", None).unwrap();
    assert_eq!(changes.latest(), Some(Some(user)));

    auth.sign_out().unwrap();
    assert_eq!(changes.latest(), Some(None));
    assert_eq!(changes.latest(), None);
}
