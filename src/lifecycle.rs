//! Todo lifecycle: creation, completion, deletion and deadline expiry.
//!
//! Every todo gets a fixed 24 hour window. Status only ever moves forward:
//! `Active -> Completed` by the owner, or `Active -> Missed` once the
//! deadline has passed. The free functions here are pure and operate on a
//! snapshot; [`TodoEngine`] applies them to the live snapshot of a session
//! and writes the results through a [`DocumentStore`].

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use crate::clock::Clock;
use crate::error::{AppError, ValidationError};
use crate::models::{NewTodo, StatusFilter, Todo, TodoId, TodoPatch, TodoStatus, UserId};
use crate::store::{DocumentStore, Requester, StoreError};

pub const DEADLINE_WINDOW_HOURS: i64 = 24;

pub fn deadline_window() -> Duration {
    Duration::hours(DEADLINE_WINDOW_HOURS)
}

pub fn deadline_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + deadline_window()
}

/// Build a new Active todo owned by `owner`. Whitespace-only titles are
/// rejected. Timestamps are cut to whole milliseconds, which is what the
/// store keeps.
pub fn new_todo(title: &str, owner: &UserId, now: DateTime<Utc>) -> Result<NewTodo, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    let created_at = now.trunc_subsecs(3);
    Ok(NewTodo {
        title: title.to_string(),
        owner: owner.clone(),
        created_at,
        deadline: deadline_for(created_at),
        status: TodoStatus::Active,
    })
}

/// Mark every Active todo whose deadline is at or before `now` as Missed.
/// Returns the ids that changed; running it again changes nothing.
pub fn sweep_expired(now: DateTime<Utc>, todos: &mut [Todo]) -> Vec<TodoId> {
    let mut expired = Vec::new();
    for todo in todos.iter_mut() {
        if todo.status == TodoStatus::Active && todo.deadline <= now {
            todo.status = TodoStatus::Missed;
            expired.push(todo.id);
        }
    }
    expired
}

/// Todos matching `criterion`, in their original order
pub fn filter(todos: &[Todo], criterion: StatusFilter) -> Vec<&Todo> {
    todos.iter().filter(|t| criterion.matches(t.status)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Remaining { hours: i64, minutes: i64 },
    Expired,
}

impl fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRemaining::Remaining { hours, minutes } => {
                write!(f, "{}h {}m remaining", hours, minutes)
            }
            TimeRemaining::Expired => f.write_str("Expired"),
        }
    }
}

/// Countdown for an Active todo, truncated to whole minutes.
/// `None` for Completed and Missed todos.
pub fn time_remaining(todo: &Todo, now: DateTime<Utc>) -> Option<TimeRemaining> {
    if todo.status != TodoStatus::Active {
        return None;
    }
    if now >= todo.deadline {
        return Some(TimeRemaining::Expired);
    }
    let left = todo.deadline - now;
    Some(TimeRemaining::Remaining {
        hours: left.num_hours(),
        minutes: left.num_minutes() % 60,
    })
}

/// Min-heap of upcoming deadlines, so the caller can sleep until exactly
/// the next expiry instead of polling.
#[derive(Debug, Default, Clone)]
pub struct DeadlineSchedule {
    heap: BinaryHeap<Reverse<(DateTime<Utc>, TodoId)>>,
}

impl DeadlineSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_todos(todos: &[Todo]) -> Self {
        let mut schedule = Self::new();
        schedule.rebuild(todos);
        schedule
    }

    /// Replace the contents with the deadlines of the Active todos in `todos`
    pub fn rebuild(&mut self, todos: &[Todo]) {
        self.heap = todos
            .iter()
            .filter(|t| t.status == TodoStatus::Active)
            .map(|t| Reverse((t.deadline, t.id)))
            .collect();
    }

    pub fn push(&mut self, todo: &Todo) {
        if todo.status == TodoStatus::Active {
            self.heap.push(Reverse((todo.deadline, todo.id)));
        }
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due().is_some_and(|deadline| deadline <= now)
    }

    /// Remove and return every entry whose deadline is at or before `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<TodoId> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            due.push(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// What a user action did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

/// Lifecycle operations against the latest known snapshot of one session.
///
/// Writes go straight to the store; the local snapshot is updated
/// optimistically after each successful write and replaced wholesale when
/// the store pushes a new result set.
pub struct TodoEngine {
    store: Rc<dyn DocumentStore>,
    clock: Rc<dyn Clock>,
    requester: Requester,
    todos: Vec<Todo>,
    schedule: DeadlineSchedule,
}

impl TodoEngine {
    pub fn new(store: Rc<dyn DocumentStore>, clock: Rc<dyn Clock>, requester: Requester) -> Self {
        Self {
            store,
            clock,
            requester,
            todos: Vec::new(),
            schedule: DeadlineSchedule::new(),
        }
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn view(&self, criterion: StatusFilter) -> Vec<&Todo> {
        filter(&self.todos, criterion)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.schedule.next_due()
    }

    pub fn has_due_deadline(&self) -> bool {
        self.schedule.is_due(self.clock.now())
    }

    /// Replace the local snapshot with a result set pushed by the store
    pub fn apply_snapshot(&mut self, todos: Vec<Todo>) {
        self.schedule.rebuild(&todos);
        self.todos = todos;
    }

    pub fn create(&mut self, title: &str) -> Result<TodoId, AppError> {
        let todo = new_todo(title, &self.requester.user_id, self.clock.now())?;
        let id = self.store.create(&self.requester, todo.clone())?;

        let todo = todo.into_todo(id);
        tracing::debug!(todo = %id, deadline = %todo.deadline, "deadline scheduled");
        self.schedule.push(&todo);
        self.todos.push(todo);
        Ok(id)
    }

    /// Complete an Active todo. Anything else is left alone.
    pub fn complete(&mut self, id: TodoId) -> Result<Outcome, AppError> {
        let status = self
            .get(id)
            .map(|t| t.status)
            .ok_or(StoreError::NotFound(id))?;
        if status != TodoStatus::Active {
            return Ok(Outcome::Unchanged);
        }

        self.store
            .update(&self.requester, id, TodoPatch::status(TodoStatus::Completed))?;

        if let Some(todo) = self.todos.iter_mut().find(|t| t.id == id) {
            todo.status = TodoStatus::Completed;
        }
        self.schedule.rebuild(&self.todos);
        Ok(Outcome::Changed)
    }

    pub fn delete(&mut self, id: TodoId) -> Result<(), AppError> {
        self.store.delete(&self.requester, id)?;
        self.todos.retain(|t| t.id != id);
        self.schedule.rebuild(&self.todos);
        Ok(())
    }

    pub fn sweep(&mut self) -> Result<Vec<TodoId>, AppError> {
        let now = self.clock.now();
        self.sweep_at(now)
    }

    /// Mark overdue todos Missed locally and in the store.
    ///
    /// A todo that the store already moved on (completed or deleted by a
    /// concurrent action) takes the store's state locally instead. Other
    /// write failures do not stop the remaining writes; the first one is
    /// returned.
    pub fn sweep_at(&mut self, now: DateTime<Utc>) -> Result<Vec<TodoId>, AppError> {
        self.schedule.pop_due(now);
        let expired = sweep_expired(now, &mut self.todos);
        if expired.is_empty() {
            return Ok(expired);
        }

        let mut first_error = None;
        let mut written = Vec::with_capacity(expired.len());
        for id in expired {
            match self
                .store
                .update(&self.requester, id, TodoPatch::status(TodoStatus::Missed))
            {
                Ok(()) => written.push(id),
                Err(StoreError::InvalidTransition { from, .. }) => {
                    tracing::debug!(todo = %id, %from, "sweep lost race, keeping store state");
                    if let Some(todo) = self.todos.iter_mut().find(|t| t.id == id) {
                        todo.status = from;
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(todo = %id, "swept todo no longer exists");
                    self.todos.retain(|t| t.id != id);
                }
                Err(e) => {
                    tracing::warn!(todo = %id, error = %e, "failed to mark todo missed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.schedule.rebuild(&self.todos);
        if !written.is_empty() {
            tracing::info!(count = written.len(), "marked overdue todos missed");
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(written),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn todo(id: i64, status: TodoStatus, created: DateTime<Utc>) -> Todo {
        Todo {
            id: TodoId(id),
            title: format!("todo {}", id),
            owner: UserId("ann".to_string()),
            created_at: created,
            deadline: deadline_for(created),
            status,
        }
    }

    #[test]
    fn new_todo_gets_a_24_hour_window() {
        let now = at(0);
        let todo = new_todo("  Buy milk ", &UserId("ann".to_string()), now).unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.status, TodoStatus::Active);
        assert_eq!(todo.created_at, now);
        assert_eq!(todo.deadline, now + Duration::hours(24));
    }

    #[test]
    fn blank_titles_are_rejected() {
        let owner = UserId("ann".to_string());
        assert_eq!(new_todo("", &owner, at(0)), Err(ValidationError::EmptyTitle));
        assert_eq!(new_todo(" \t ", &owner, at(0)), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn sweep_marks_only_overdue_active_todos() {
        let mut todos = vec![
            todo(1, TodoStatus::Active, at(0)),
            todo(2, TodoStatus::Completed, at(0)),
            todo(3, TodoStatus::Active, at(3600)),
        ];
        let now = at(0) + Duration::hours(24);

        let changed = sweep_expired(now, &mut todos);
        assert_eq!(changed, vec![TodoId(1)]);
        assert_eq!(todos[0].status, TodoStatus::Missed);
        assert_eq!(todos[1].status, TodoStatus::Completed);
        assert_eq!(todos[2].status, TodoStatus::Active);
    }

    #[test]
    fn sweep_is_idempotent() {
        let mut todos = vec![
            todo(1, TodoStatus::Active, at(0)),
            todo(2, TodoStatus::Active, at(10)),
        ];
        let now = at(0) + Duration::days(2);
        sweep_expired(now, &mut todos);
        let once = todos.clone();
        assert!(sweep_expired(now, &mut todos).is_empty());
        assert_eq!(todos, once);
    }

    #[test]
    fn sweep_never_touches_completed() {
        let mut todos = vec![todo(1, TodoStatus::Completed, at(0))];
        assert!(sweep_expired(at(0) + Duration::days(30), &mut todos).is_empty());
        assert_eq!(todos[0].status, TodoStatus::Completed);
    }

    #[test]
    fn filter_all_is_identity() {
        let todos = vec![
            todo(3, TodoStatus::Missed, at(0)),
            todo(1, TodoStatus::Active, at(0)),
            todo(2, TodoStatus::Completed, at(0)),
        ];
        let all: Vec<Todo> = filter(&todos, StatusFilter::All).into_iter().cloned().collect();
        assert_eq!(all, todos);
    }

    #[test]
    fn filter_keeps_every_match_in_order() {
        let todos = vec![
            todo(5, TodoStatus::Active, at(0)),
            todo(1, TodoStatus::Missed, at(0)),
            todo(4, TodoStatus::Active, at(0)),
        ];
        let active: Vec<TodoId> = filter(&todos, StatusFilter::Active).iter().map(|t| t.id).collect();
        assert_eq!(active, vec![TodoId(5), TodoId(4)]);
        assert!(filter(&todos, StatusFilter::Completed).is_empty());
    }

    #[test]
    fn time_remaining_truncates() {
        let t = todo(1, TodoStatus::Active, at(0));
        // 24h window minus 1h 30m 59s leaves 22h 29m 1s
        let now = at(0) + Duration::seconds(3600 + 30 * 60 + 59);
        assert_eq!(
            time_remaining(&t, now),
            Some(TimeRemaining::Remaining { hours: 22, minutes: 29 })
        );
        assert_eq!(time_remaining(&t, now).unwrap().to_string(), "22h 29m remaining");
    }

    #[test]
    fn time_remaining_at_deadline_is_expired() {
        let t = todo(1, TodoStatus::Active, at(0));
        assert_eq!(time_remaining(&t, t.deadline), Some(TimeRemaining::Expired));
        assert_eq!(
            time_remaining(&t, t.deadline - Duration::seconds(59)),
            Some(TimeRemaining::Remaining { hours: 0, minutes: 0 })
        );
        assert_eq!(time_remaining(&t, t.deadline + Duration::hours(3)), Some(TimeRemaining::Expired));
    }

    #[test]
    fn time_remaining_is_none_for_terminal_todos() {
        assert_eq!(time_remaining(&todo(1, TodoStatus::Completed, at(0)), at(5)), None);
        assert_eq!(time_remaining(&todo(1, TodoStatus::Missed, at(0)), at(5)), None);
    }

    #[test]
    fn schedule_orders_by_deadline() {
        let todos = vec![
            todo(1, TodoStatus::Active, at(500)),
            todo(2, TodoStatus::Active, at(100)),
            todo(3, TodoStatus::Completed, at(0)),
        ];
        let mut schedule = DeadlineSchedule::from_todos(&todos);
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.next_due(), Some(deadline_for(at(100))));
        assert!(!schedule.is_due(deadline_for(at(99))));

        let due = schedule.pop_due(deadline_for(at(100)));
        assert_eq!(due, vec![TodoId(2)]);
        assert_eq!(schedule.next_due(), Some(deadline_for(at(500))));
    }
}
