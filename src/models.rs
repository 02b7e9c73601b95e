use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier of a todo (SQLite row id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(pub i64);

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque user identifier handed out by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    Active,
    Completed,
    Missed,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Active => "active",
            TodoStatus::Completed => "completed",
            TodoStatus::Missed => "missed",
        }
    }

    /// Completed and Missed never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TodoStatus::Active)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    /// Re-writing the same terminal status is accepted so that repeated
    /// sweeps stay idempotent.
    pub fn can_transition_to(&self, next: TodoStatus) -> bool {
        match (self, next) {
            (TodoStatus::Active, TodoStatus::Completed | TodoStatus::Missed) => true,
            (current, next) if *current == next && current.is_terminal() => true,
            _ => false,
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(TodoStatus::Active),
            "completed" => Ok(TodoStatus::Completed),
            "missed" => Ok(TodoStatus::Missed),
            other => Err(format!("Unknown todo status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: TodoStatus,
}

/// A todo that has not been written to the store yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub status: TodoStatus,
}

impl NewTodo {
    pub fn into_todo(self, id: TodoId) -> Todo {
        Todo {
            id,
            title: self.title,
            owner: self.owner,
            created_at: self.created_at,
            deadline: self.deadline,
            status: self.status,
        }
    }
}

/// Partial update of a stored todo. Only the status is mutable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub status: Option<TodoStatus>,
}

impl TodoPatch {
    pub fn status(status: TodoStatus) -> Self {
        Self { status: Some(status) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Name shown in greetings: display name if set, email otherwise
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// View criterion for the todo list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
    Missed,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Active,
        StatusFilter::Completed,
        StatusFilter::Missed,
    ];

    pub fn matches(&self, status: TodoStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => status == TodoStatus::Active,
            StatusFilter::Completed => status == TodoStatus::Completed,
            StatusFilter::Missed => status == TodoStatus::Missed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Active => "Active",
            StatusFilter::Completed => "Completed",
            StatusFilter::Missed => "Missed",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            StatusFilter::All => 0,
            StatusFilter::Active => 1,
            StatusFilter::Completed => 2,
            StatusFilter::Missed => 3,
        }
    }

    pub fn next(&self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "active" => Ok(StatusFilter::Active),
            "completed" => Ok(StatusFilter::Completed),
            "missed" => Ok(StatusFilter::Missed),
            other => Err(format!(
                "Unknown filter '{}' (expected all, active, completed or missed)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_todos_can_move() {
        assert!(TodoStatus::Active.can_transition_to(TodoStatus::Completed));
        assert!(TodoStatus::Active.can_transition_to(TodoStatus::Missed));
        assert!(!TodoStatus::Completed.can_transition_to(TodoStatus::Missed));
        assert!(!TodoStatus::Missed.can_transition_to(TodoStatus::Completed));
        assert!(!TodoStatus::Completed.can_transition_to(TodoStatus::Active));
        assert!(!TodoStatus::Missed.can_transition_to(TodoStatus::Active));
        assert!(!TodoStatus::Active.can_transition_to(TodoStatus::Active));
    }

    #[test]
    fn repeated_terminal_write_is_allowed() {
        assert!(TodoStatus::Missed.can_transition_to(TodoStatus::Missed));
        assert!(TodoStatus::Completed.can_transition_to(TodoStatus::Completed));
    }

    #[test]
    fn filter_parses_case_insensitively() {
        assert_eq!("Missed".parse::<StatusFilter>(), Ok(StatusFilter::Missed));
        assert_eq!(" all ".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert!("overdue".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn filter_next_cycles() {
        assert_eq!(StatusFilter::All.next(), StatusFilter::Active);
        assert_eq!(StatusFilter::Missed.next(), StatusFilter::All);
    }

    #[test]
    fn user_label_falls_back_to_email() {
        let mut user = User {
            id: UserId("u1".to_string()),
            email: "ann@gmail.com".to_string(),
            display_name: Some("  ".to_string()),
            role: Role::User,
            created_at: Utc::now(),
        };
        assert_eq!(user.label(), "ann@gmail.com");
        user.display_name = Some("Ann".to_string());
        assert_eq!(user.label(), "Ann");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&TodoStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
