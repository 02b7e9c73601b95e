use chrono::{DateTime, Duration};
use std::rc::Rc;

use daylist::clock::ManualClock;
use daylist::lifecycle::{Outcome, TodoEngine};
use daylist::models::{Role, TodoStatus, User, UserId};
use daylist::store::{DocumentStore, Requester, SqliteStore, TodoQuery};
use daylist::Session;

fn user(id: &str, role: Role) -> User {
    User {
        id: UserId(id.to_string()),
        email: format!("{}@gmail.com", id),
        display_name: None,
        role,
        created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    }
}

/// Two clients on one database file, as when the CLI runs next to the TUI
#[test]
fn writes_from_another_connection_reach_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("daylist.db");
    let db = db.to_str().unwrap();

    let tui_store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
    let cli_store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let ann = user("ann", Role::User);

    let mut tui = Session::start(tui_store, Rc::new(clock.clone()), ann.clone(), Duration::seconds(60)).unwrap();
    let mut cli = Session::start(cli_store.clone(), Rc::new(clock.clone()), ann, Duration::seconds(60)).unwrap();

    let id = cli.engine_mut().create("Buy milk").unwrap();
    assert!(tui.engine().todos().is_empty());
    assert!(tui.pump().unwrap());
    assert_eq!(tui.engine().get(id).unwrap().title, "Buy milk");

    // The TUI's timer fires and the other client sees the result
    clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert_eq!(tui.tick().unwrap(), vec![id]);
    cli.pump().unwrap();
    assert_eq!(cli.engine().get(id).unwrap().status, TodoStatus::Missed);

    // Completing after the sweep leaves the todo Missed
    assert_eq!(cli.engine_mut().complete(id).unwrap(), Outcome::Unchanged);
    let stored = cli_store.fetch(&TodoQuery::All).unwrap();
    assert_eq!(stored[0].status, TodoStatus::Missed);
}

#[test]
fn reopening_keeps_todos() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("daylist.db");
    let db = db.to_str().unwrap();
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());

    {
        let store: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
        let mut session = Session::start(store, Rc::new(clock.clone()), user("ann", Role::User), Duration::seconds(60)).unwrap();
        session.engine_mut().create("Buy milk").unwrap();
        session.end();
    }

    let store = SqliteStore::open(db).unwrap();
    let todos = store.fetch(&TodoQuery::Owner(UserId("ann".to_string()))).unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].deadline - todos[0].created_at, Duration::hours(24));
}

#[test]
fn sweep_takes_store_state_when_another_client_acted_first() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("daylist.db");
    let db = db.to_str().unwrap();
    let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    let ann = Requester::from(&user("ann", Role::User));

    let store_a: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
    let store_b: Rc<dyn DocumentStore> = Rc::new(SqliteStore::open(db).unwrap());
    let mut a = TodoEngine::new(store_a.clone(), Rc::new(clock.clone()), ann.clone());
    let mut b = TodoEngine::new(store_b.clone(), Rc::new(clock.clone()), ann);

    let milk = a.create("Buy milk").unwrap();
    let bread = a.create("Buy bread").unwrap();
    b.apply_snapshot(store_b.fetch(&TodoQuery::All).unwrap());

    // B acts past the deadline before A's timer fires
    clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert_eq!(b.complete(milk).unwrap(), Outcome::Changed);
    b.delete(bread).unwrap();

    assert!(a.sweep().unwrap().is_empty());
    assert_eq!(a.get(milk).unwrap().status, TodoStatus::Completed);
    assert!(a.get(bread).is_none());
    assert_eq!(a.next_deadline(), None);

    let stored = store_a.fetch(&TodoQuery::All).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, TodoStatus::Completed);
}
