use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use crate::lifecycle::deadline_for;
use crate::models::{NewTodo, Todo, TodoId, TodoPatch, TodoStatus, UserId};
use crate::store::{DocumentStore, Requester, StoreError, SubscriberRegistry, Subscription, TodoQuery};

const TODO_COLUMNS: &str = "id, title, owner, created_at, deadline, status";

impl ToSql for TodoStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TodoStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Timestamps are stored as Unix milliseconds
fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

fn from_millis(column: usize, millis: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            Box::new(FromSqlError::OutOfRange(millis)),
        )
    })
}

/// SQLite-backed document store with an in-process change feed
pub struct SqliteStore {
    conn: Connection,
    subscribers: Rc<RefCell<SubscriberRegistry>>,
    data_version: Cell<i64>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Directory(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::from_connection(conn)
    }

    /// Private database that disappears with the store. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let store = SqliteStore {
            conn,
            subscribers: SubscriberRegistry::new(),
            data_version: Cell::new(0),
        };
        store.initialize_schema()?;
        store.data_version.set(store.read_data_version()?);
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS todos (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                owner           TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                deadline        INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'active'
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_todos_owner ON todos(owner)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_todos_status_deadline ON todos(status, deadline)",
            [],
        )?;

        Ok(())
    }

    fn read_data_version(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }

    fn row_to_todo(row: &rusqlite::Row) -> Result<Todo, rusqlite::Error> {
        Ok(Todo {
            id: TodoId(row.get(0)?),
            title: row.get(1)?,
            owner: UserId(row.get(2)?),
            created_at: from_millis(3, row.get(3)?)?,
            deadline: from_millis(4, row.get(4)?)?,
            status: row.get(5)?,
        })
    }

    fn load(conn: &Connection, query: &TodoQuery) -> Result<Vec<Todo>, StoreError> {
        let todos = match query {
            TodoQuery::All => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM todos ORDER BY id ASC",
                    TODO_COLUMNS
                ))?;
                stmt.query_map([], Self::row_to_todo)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            TodoQuery::Owner(owner) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM todos WHERE owner = ?1 ORDER BY id ASC",
                    TODO_COLUMNS
                ))?;
                stmt.query_map(rusqlite::params![owner.as_str()], Self::row_to_todo)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(todos)
    }

    fn load_one(tx: &Transaction, id: TodoId) -> Result<Todo, StoreError> {
        tx.query_row(
            &format!("SELECT {} FROM todos WHERE id = ?1", TODO_COLUMNS),
            rusqlite::params![id.0],
            Self::row_to_todo,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    /// Push fresh snapshots to every live subscription
    fn publish(&self) -> Result<(), StoreError> {
        self.data_version.set(self.read_data_version()?);
        let conn = &self.conn;
        self.subscribers
            .borrow_mut()
            .publish(|query| Self::load(conn, query))
    }

    fn validate_new(requester: &Requester, todo: &NewTodo) -> Result<(), StoreError> {
        if todo.owner != requester.user_id {
            return Err(StoreError::ForeignOwner);
        }
        if todo.title.trim().is_empty() {
            return Err(StoreError::InvalidRecord("title is empty".to_string()));
        }
        if todo.deadline != deadline_for(todo.created_at) {
            return Err(StoreError::InvalidRecord(
                "deadline must be 24 hours after creation".to_string(),
            ));
        }
        if todo.status != TodoStatus::Active {
            return Err(StoreError::InvalidRecord(
                "new todos must be active".to_string(),
            ));
        }
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn create(&self, requester: &Requester, todo: NewTodo) -> Result<TodoId, StoreError> {
        Self::validate_new(requester, &todo)?;

        self.conn.execute(
            "INSERT INTO todos (title, owner, created_at, deadline, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                todo.title,
                todo.owner.as_str(),
                to_millis(todo.created_at),
                to_millis(todo.deadline),
                todo.status,
            ],
        )?;
        let id = TodoId(self.conn.last_insert_rowid());
        tracing::info!(todo = %id, owner = %todo.owner, "todo created");

        self.publish()?;
        Ok(id)
    }

    fn update(&self, requester: &Requester, id: TodoId, patch: TodoPatch) -> Result<(), StoreError> {
        let Some(next) = patch.status else {
            return Ok(());
        };

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let current = Self::load_one(&tx, id)?;

        if !requester.can_modify(&current.owner) {
            tracing::warn!(todo = %id, requester = %requester.user_id, "status change denied");
            return Err(StoreError::PermissionDenied(id));
        }
        if !current.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to: next,
            });
        }
        if current.status == next {
            // Same terminal status written twice
            return Ok(());
        }

        tx.execute(
            "UPDATE todos SET status = ?1 WHERE id = ?2 AND status = ?3",
            rusqlite::params![next, id.0, current.status],
        )?;
        tx.commit()?;
        tracing::info!(todo = %id, from = %current.status, to = %next, "todo status changed");

        self.publish()
    }

    fn delete(&self, requester: &Requester, id: TodoId) -> Result<(), StoreError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let current = Self::load_one(&tx, id)?;

        if !requester.can_modify(&current.owner) {
            tracing::warn!(todo = %id, requester = %requester.user_id, "delete denied");
            return Err(StoreError::PermissionDenied(id));
        }

        tx.execute("DELETE FROM todos WHERE id = ?1", rusqlite::params![id.0])?;
        tx.commit()?;
        tracing::info!(todo = %id, "todo deleted");

        self.publish()
    }

    fn fetch(&self, query: &TodoQuery) -> Result<Vec<Todo>, StoreError> {
        Self::load(&self.conn, query)
    }

    fn subscribe(&self, query: TodoQuery) -> Result<Subscription, StoreError> {
        let snapshot = Self::load(&self.conn, &query)?;
        let (subscription, sender) = SubscriberRegistry::register(&self.subscribers, query);
        // The receiver is held by `subscription`, so this cannot fail
        let _ = sender.send(snapshot);
        Ok(subscription)
    }

    fn poll_changes(&self) -> Result<bool, StoreError> {
        let version = self.read_data_version()?;
        if version == self.data_version.get() {
            return Ok(false);
        }
        tracing::debug!(version, "external change detected");
        self.publish()?;
        Ok(true)
    }
}
