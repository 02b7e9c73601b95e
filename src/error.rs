use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Input rejected before anything reaches the store or the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Email address is not valid")]
    InvalidEmail,
    #[error("Only @{0} addresses can register")]
    EmailDomainNotAllowed(String),
    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AppError {
    /// Failures the user can fix by simply trying again
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Validation(_) => false,
            AppError::Auth(e) => e.is_retryable(),
            AppError::Store(e) => e.is_retryable(),
        }
    }

    /// One-line message for the status bar
    pub fn notification(&self) -> Notification {
        let text = match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(e) => format!("Sign-in failed: {}", e),
            AppError::Store(e) if e.is_retryable() => format!("Could not save, try again: {}", e),
            AppError::Store(e) => e.to_string(),
        };
        Notification::error(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
}

/// Transient message surfaced to the user after an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub text: String,
}

impl Notification {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            text: text.into(),
        }
    }
}
