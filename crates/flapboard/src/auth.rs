//! Identity provider and the write gate.
//!
//! Users live in the board database next to the data they edit. The
//! signed-in user is persisted too, so separate CLI invocations share one
//! session.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::SqliteStore;

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Provider-assigned id.
    pub id: String,
    /// Login email, lowercased.
    pub email: String,
}

/// Sign-up, sign-in and session lookup.
#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Create an account and sign it in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<User>;

    /// Sign in with existing credentials.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;

    /// End the current session. Signing out with no session is not an error.
    async fn sign_out(&self) -> Result<()>;

    /// The signed-in user, if any.
    async fn current_user(&self) -> Result<Option<User>>;
}

/// Email/password accounts stored in the board database.
#[derive(Debug, Clone)]
pub struct LocalIdentityProvider {
    store: Arc<SqliteStore>,
}

impl LocalIdentityProvider {
    /// Use the `users` and `session` tables of `store`.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(Error::validation("email", format!("{email:?} is not an email address"))),
    }
}

fn hash_password(salt: &str, password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize()
}

fn new_salt(email: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(email.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

fn start_session(conn: &rusqlite::Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO session (slot, user_id, signed_in_at) VALUES (1, ?1, ?2)",
        params![user_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        let user = self.store.with_conn(|conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
                params![email],
                |row| row.get(0),
            )?;
            if exists {
                return Err(Error::auth("email already in use"));
            }

            let salt = new_salt(&email);
            let hash = hash_password(&salt, password);
            tx.execute(
                "INSERT INTO users (email, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![email, hash.to_hex().as_str(), salt, Utc::now().to_rfc3339()],
            )?;
            let id = tx.last_insert_rowid();
            start_session(&tx, id)?;
            tx.commit()?;
            Ok(User {
                id: id.to_string(),
                email: email.clone(),
            })
        })?;

        info!("Signed up {}", user.email);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let email = normalize_email(email)?;
        let user = self.store.with_conn(|conn| {
            let row: Option<(i64, String, String)> = conn
                .query_row(
                    "SELECT id, password_hash, salt FROM users WHERE email = ?1",
                    params![email],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let Some((id, stored, salt)) = row else {
                return Err(Error::auth("invalid email or password"));
            };
            let stored = blake3::Hash::from_hex(&stored)
                .map_err(|e| Error::internal(format!("corrupt password hash: {e}")))?;
            if hash_password(&salt, password) != stored {
                return Err(Error::auth("invalid email or password"));
            }

            start_session(conn, id)?;
            Ok(User {
                id: id.to_string(),
                email: email.clone(),
            })
        })?;

        info!("Signed in {}", user.email);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        let removed = self
            .store
            .with_conn(|conn| Ok(conn.execute("DELETE FROM session", [])?))?;
        debug!("Signed out ({} session rows removed)", removed);
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT u.id, u.email FROM session s JOIN users u ON u.id = s.user_id
                     WHERE s.slot = 1",
                    [],
                    |row| {
                        Ok(User {
                            id: row.get::<_, i64>(0)?.to_string(),
                            email: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
    }
}

/// Decides whether writes need a signed-in user.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    required: bool,
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl AuthGate {
    /// A gate that lets every write through.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A gate backed by `provider`. When `required`, writes without a
    /// signed-in user fail with [`Error::NotAuthenticated`].
    #[must_use]
    pub fn new(required: bool, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            required,
            provider: Some(provider),
        }
    }

    /// Whether writes need a signed-in user.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Check the gate before a write, returning the acting user if known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] when sign-in is required and
    /// nobody is signed in.
    pub async fn check(&self) -> Result<Option<User>> {
        let user = match &self.provider {
            Some(provider) => provider.current_user().await?,
            None => None,
        };
        if self.required && user.is_none() {
            return Err(Error::NotAuthenticated);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalIdentityProvider {
        LocalIdentityProvider::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn test_sign_up_signs_in() {
        let auth = provider();
        let user = auth.sign_up(" Admin@School.org ", "secret1").await.unwrap();
        assert_eq!(user.email, "admin@school.org");
        assert_eq!(auth.current_user().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_sign_up_rejects_short_password() {
        let err = provider().sign_up("a@b.org", "12345").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_sign_up_rejects_bad_email() {
        let err = provider().sign_up("not-an-email", "secret1").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_sign_up_duplicate_email() {
        let auth = provider();
        auth.sign_up("a@b.org", "secret1").await.unwrap();
        let err = auth.sign_up("A@B.org", "other12").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let auth = provider();
        auth.sign_up("a@b.org", "secret1").await.unwrap();
        auth.sign_out().await.unwrap();
        assert_eq!(auth.current_user().await.unwrap(), None);

        let err = auth.sign_in("a@b.org", "wrong!!").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(auth.current_user().await.unwrap(), None);

        let user = auth.sign_in("a@b.org", "secret1").await.unwrap();
        assert_eq!(auth.current_user().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_sign_in_unknown_user() {
        let err = provider().sign_in("ghost@b.org", "secret1").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn test_sign_out_without_session() {
        provider().sign_out().await.unwrap();
    }

    #[tokio::test]
    async fn test_gate_disabled_allows_anonymous() {
        assert_eq!(AuthGate::disabled().check().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_gate_required() {
        let auth = Arc::new(provider());
        let gate = AuthGate::new(true, auth.clone());
        assert!(gate.is_required());
        assert!(gate.check().await.unwrap_err().is_not_authenticated());

        auth.sign_up("a@b.org", "secret1").await.unwrap();
        let user = gate.check().await.unwrap().unwrap();
        assert_eq!(user.email, "a@b.org");
    }

    #[tokio::test]
    async fn test_gate_optional_reports_user() {
        let auth = Arc::new(provider());
        auth.sign_up("a@b.org", "secret1").await.unwrap();
        let gate = AuthGate::new(false, auth);
        assert!(gate.check().await.unwrap().is_some());
    }

    #[test]
    fn test_hash_depends_on_salt() {
        assert_ne!(hash_password("a", "pw"), hash_password("b", "pw"));
        assert_eq!(hash_password("a", "pw"), hash_password("a", "pw"));
    }
}
