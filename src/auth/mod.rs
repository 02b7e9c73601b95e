//! Authentication seam.
//!
//! The lifecycle engine only needs to know who is signed in. Everything
//! about credentials lives behind [`AuthProvider`]; [`local::LocalAuth`]
//! keeps accounts in SQLite next to the todos.

pub mod local;

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use thiserror::Error;

use crate::error::ValidationError;
use crate::models::User;

pub use local::LocalAuth;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Wrong email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    EmailInUse,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Account storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    Directory(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Storage(_) | AuthError::Directory(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity already verified by an external OAuth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthIdentity {
    pub provider: OAuthProvider,
    /// Stable account id at the provider (`sub` claim)
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Which addresses may open an account. Sign-in is never restricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailPolicy {
    pub registration_domain: Option<String>,
}

impl Default for EmailPolicy {
    fn default() -> Self {
        Self {
            registration_domain: Some("gmail.com".to_string()),
        }
    }
}

impl EmailPolicy {
    pub fn unrestricted() -> Self {
        Self {
            registration_domain: None,
        }
    }

    /// Empty domain strings mean "anyone may register"
    pub fn for_domain(domain: &str) -> Self {
        let domain = domain.trim().trim_start_matches('@').to_lowercase();
        Self {
            registration_domain: (!domain.is_empty()).then_some(domain),
        }
    }

    /// Normalized address if it may be used to register
    pub fn check_registration(&self, email: &str) -> Result<String, ValidationError> {
        let email = normalize_email(email)?;
        if let Some(ref domain) = self.registration_domain {
            let actual = email.rsplit('@').next().unwrap_or_default();
            if actual != domain {
                return Err(ValidationError::EmailDomainNotAllowed(domain.clone()));
            }
        }
        Ok(email)
    }
}

/// Trim and lower-case an address, rejecting anything without a usable
/// local part and dotted domain
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let valid = !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace);
    if valid {
        Ok(email)
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort(MIN_PASSWORD_LEN));
    }
    Ok(())
}

pub trait AuthProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

    fn sign_in_with_oauth(&self, identity: OAuthIdentity) -> Result<User, AuthError>;

    fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<User, AuthError>;

    fn sign_out(&self) -> Result<(), AuthError>;

    fn current_user(&self) -> Option<User>;

    /// Every registered account, oldest first
    fn list_users(&self) -> Result<Vec<User>, AuthError>;

    /// Stream of the signed-in user. Starts with the current value.
    fn on_auth_change(&self) -> AuthSubscription;
}

/// Receiving end of [`AuthProvider::on_auth_change`]
pub struct AuthSubscription {
    receiver: Receiver<Option<User>>,
}

impl AuthSubscription {
    /// Most recent auth state since the last call, if it changed.
    /// `Some(None)` means somebody signed out.
    pub fn latest(&self) -> Option<Option<User>> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(state) => latest = Some(state),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }
}

/// Fan-out of auth state changes to every live [`AuthSubscription`]
#[derive(Default)]
pub struct AuthListeners {
    senders: RefCell<Vec<Sender<Option<User>>>>,
}

impl AuthListeners {
    pub fn subscribe(&self, current: Option<User>) -> AuthSubscription {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(current);
        self.senders.borrow_mut().push(sender);
        AuthSubscription { receiver }
    }

    pub fn notify(&self, user: Option<User>) {
        self.senders
            .borrow_mut()
            .retain(|sender| sender.send(user.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_domain_is_enforced() {
        let policy = EmailPolicy::default();
        assert_eq!(policy.check_registration(" Ann@Gmail.com "), Ok("ann@gmail.com".to_string()));
        assert_eq!(
            policy.check_registration("ann@example.com"),
            Err(ValidationError::EmailDomainNotAllowed("gmail.com".to_string()))
        );
        assert!(EmailPolicy::unrestricted().check_registration("ann@example.com").is_ok());
    }

    #[test]
    fn empty_domain_disables_restriction() {
        assert_eq!(EmailPolicy::for_domain(""), EmailPolicy::unrestricted());
        assert_eq!(
            EmailPolicy::for_domain("@Example.org").registration_domain.as_deref(),
            Some("example.org")
        );
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "ann", "@gmail.com", "ann@", "ann@gmail", "a b@gmail.com", "ann@@gmail.com"] {
            assert_eq!(normalize_email(bad), Err(ValidationError::InvalidEmail), "{}", bad);
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert_eq!(check_password("12345"), Err(ValidationError::PasswordTooShort(6)));
        assert!(check_password("123456").is_ok());
    }

    #[test]
    fn listeners_get_current_state_first() {
        let listeners = AuthListeners::default();
        let sub = listeners.subscribe(None);
        assert_eq!(sub.latest(), Some(None));
        assert_eq!(sub.latest(), None);

        drop(sub);
        listeners.notify(None);
        assert!(listeners.is_empty());
    }
}
