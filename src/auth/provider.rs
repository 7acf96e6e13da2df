use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::AuthError;
use crate::config;

/// Authenticated entity making a request, with its granted scopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub email: String,
    pub disabled: bool,
    pub scopes: Vec<String>,
}

/// Resolves credentials and usernames to principals.
///
/// Injected into the app state so handlers never talk to a user table
/// directly; swap the implementation for tests or alternate stores.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Verify a username/password pair, returning the matching principal
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError>;

    /// Look up a principal by username; `None` when unknown
    async fn lookup(&self, username: &str) -> Result<Option<Principal>, AuthError>;
}

/// Salted SHA-256 password digest, hex encoded
pub fn hash_password(password: &str) -> String {
    let salt = &config::config().security.password_salt;
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    username: String,
    email: String,
    disabled: bool,
    scopes: Vec<String>,
    password_hash: String,
}

impl From<UserRow> for Principal {
    fn from(row: UserRow) -> Self {
        Self {
            username: row.username,
            email: row.email,
            disabled: row.disabled,
            scopes: row.scopes,
        }
    }
}

/// `AuthProvider` backed by the `users` table
pub struct PgAuthProvider {
    pool: PgPool,
}

impl PgAuthProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, username: &str) -> Result<Option<UserRow>, AuthError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT username, email, disabled, scopes, password_hash \
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl AuthProvider for PgAuthProvider {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let user = self
            .fetch_user(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if user.password_hash != hash_password(password) {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user.into())
    }

    async fn lookup(&self, username: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self.fetch_user(username).await?.map(Principal::from))
    }
}
