use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::path::PathBuf;

use crate::auth::{
    check_password, normalize_email, AuthError, AuthListeners, AuthProvider, AuthSubscription,
    EmailPolicy, OAuthIdentity,
};
use crate::models::{Role, User, UserId};

const USER_COLUMNS: &str = "id, email, display_name, role, created_at";

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Accounts stored in SQLite with argon2 password hashes.
///
/// The first account ever created becomes the only admin. The role is
/// decided inside an immediate (write-locked) transaction and backed by a
/// partial unique index, so two simultaneous first registrations cannot
/// both end up admin.
pub struct LocalAuth {
    conn: Connection,
    policy: EmailPolicy,
    current: RefCell<Option<User>>,
    listeners: AuthListeners,
}

impl LocalAuth {
    pub fn open(path: &str, policy: EmailPolicy) -> Result<Self, AuthError> {
        let db_path = PathBuf::from(path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AuthError::Directory(e.to_string()))?;
            }
        }

        Self::from_connection(Connection::open(&db_path)?, policy)
    }

    pub fn open_in_memory(policy: EmailPolicy) -> Result<Self, AuthError> {
        Self::from_connection(Connection::open_in_memory()?, policy)
    }

    fn from_connection(conn: Connection, policy: EmailPolicy) -> Result<Self, AuthError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let auth = LocalAuth {
            conn,
            policy,
            current: RefCell::new(None),
            listeners: AuthListeners::default(),
        };
        auth.initialize_schema()?;
        Ok(auth)
    }

    fn initialize_schema(&self) -> Result<(), AuthError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                display_name    TEXT,
                password_hash   TEXT,
                oauth_provider  TEXT,
                oauth_subject   TEXT,
                role            TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            )",
            [],
        )?;

        // At most one admin, enforced by SQLite itself
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_single_admin ON users(role) WHERE role = 'admin'",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_oauth ON users(oauth_provider, oauth_subject)
             WHERE oauth_provider IS NOT NULL",
            [],
        )?;

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
        let millis: i64 = row.get(4)?;
        let created_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Integer,
                Box::new(FromSqlError::OutOfRange(millis)),
            )
        })?;
        Ok(User {
            id: UserId(row.get(0)?),
            email: row.get(1)?,
            display_name: row.get(2)?,
            role: row.get(3)?,
            created_at,
        })
    }

    fn find_by_email(conn: &Connection, email: &str) -> Result<Option<(User, Option<String>)>, AuthError> {
        let found = conn
            .query_row(
                &format!("SELECT {}, password_hash FROM users WHERE email = ?1", USER_COLUMNS),
                rusqlite::params![email],
                |row| Ok((Self::row_to_user(row)?, row.get::<_, Option<String>>(5)?)),
            )
            .optional()?;
        Ok(found)
    }

    fn find_by_oauth(conn: &Connection, identity: &OAuthIdentity) -> Result<Option<User>, AuthError> {
        let found = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE oauth_provider = ?1 AND oauth_subject = ?2",
                    USER_COLUMNS
                ),
                rusqlite::params![identity.provider.as_str(), identity.subject],
                Self::row_to_user,
            )
            .optional()?;
        Ok(found)
    }

    /// Number of registered accounts
    pub fn user_count(&self) -> Result<i64, AuthError> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    /// Admin if nobody holds the role yet. Must run inside a write transaction.
    fn claim_role(tx: &Transaction) -> Result<Role, AuthError> {
        let admin_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')",
            [],
            |row| row.get(0),
        )?;
        Ok(if admin_exists { Role::User } else { Role::Admin })
    }

    fn insert_user(
        tx: &Transaction,
        email: &str,
        display_name: Option<&str>,
        password_hash: Option<&str>,
        oauth: Option<&OAuthIdentity>,
    ) -> Result<User, AuthError> {
        let role = Self::claim_role(tx)?;
        let user = User {
            id: UserId::generate(),
            email: email.to_string(),
            display_name: display_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            role,
            created_at: Utc::now(),
        };

        tx.execute(
            "INSERT INTO users (id, email, display_name, password_hash, oauth_provider, oauth_subject, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                user.id.as_str(),
                user.email,
                user.display_name,
                password_hash,
                oauth.map(|o| o.provider.as_str()),
                oauth.map(|o| o.subject.as_str()),
                user.role,
                user.created_at.timestamp_millis(),
            ],
        )?;
        Ok(user)
    }

    fn hash_password(password: &str) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hash(e.to_string()))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify_password(password: &str, stored: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(stored).map_err(|e| AuthError::Hash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    fn set_current(&self, user: Option<User>) {
        *self.current.borrow_mut() = user.clone();
        self.listeners.notify(user);
    }
}

impl AuthProvider for LocalAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;

        let Some((user, stored)) = Self::find_by_email(&self.conn, &email)? else {
            tracing::info!("sign-in rejected: unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(stored) = stored else {
            tracing::info!(user = %user.id, "sign-in rejected: account has no password");
            return Err(AuthError::InvalidCredentials);
        };
        if !Self::verify_password(password, &stored)? {
            tracing::info!(user = %user.id, "sign-in rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(user = %user.id, role = user.role.as_str(), "signed in");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_in_with_oauth(&self, identity: OAuthIdentity) -> Result<User, AuthError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let user = if let Some(user) = Self::find_by_oauth(&tx, &identity)? {
            user
        } else {
            let email = normalize_email(&identity.email)?;
            if let Some((user, _)) = Self::find_by_email(&tx, &email)? {
                tx.execute(
                    "UPDATE users SET oauth_provider = ?1, oauth_subject = ?2 WHERE id = ?3",
                    rusqlite::params![identity.provider.as_str(), identity.subject, user.id.as_str()],
                )?;
                tracing::info!(user = %user.id, provider = %identity.provider, "linked oauth identity");
                user
            } else {
                let email = self.policy.check_registration(&email)?;
                let user = Self::insert_user(
                    &tx,
                    &email,
                    identity.display_name.as_deref(),
                    None,
                    Some(&identity),
                )?;
                tracing::info!(user = %user.id, role = user.role.as_str(), provider = %identity.provider, "registered via oauth");
                user
            }
        };
        tx.commit()?;

        tracing::info!(user = %user.id, provider = %identity.provider, "signed in");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<User, AuthError> {
        let email = self.policy.check_registration(email)?;
        check_password(password)?;
        let password_hash = Self::hash_password(password)?;

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        if Self::find_by_email(&tx, &email)?.is_some() {
            return Err(AuthError::EmailInUse);
        }
        let user = Self::insert_user(&tx, &email, display_name, Some(&password_hash), None)?;
        tx.commit()?;

        tracing::info!(user = %user.id, role = user.role.as_str(), "registered");
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.current.borrow().clone();
        if let Some(user) = previous {
            tracing::info!(user = %user.id, "signed out");
            self.set_current(None);
        }
        Ok(())
    }

    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC, rowid ASC",
            USER_COLUMNS
        ))?;
        let users = stmt.query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn on_auth_change(&self) -> AuthSubscription {
        self.listeners.subscribe(self.current_user())
    }
}
