use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;

pub mod provider;
pub mod scopes;

pub use provider::{AuthProvider, PgAuthProvider, Principal};
pub use scopes::require_scopes;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("The current user has been disabled.")]
    Disabled,

    #[error("Not enough permissions")]
    InsufficientScope,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Bearer token claims: subject username plus the scopes granted at issue time
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(username: String, scopes: Vec<String>) -> Self {
        let now = Utc::now();
        let expiry_minutes = config::config().security.token_expiry_minutes;
        Self {
            sub: username,
            scopes,
            exp: (now + Duration::minutes(expiry_minutes)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

/// OAuth2 token response
#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

pub fn generate_token(username: &str, scopes: Vec<String>) -> Result<Token, AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::TokenGeneration("JWT secret not configured".to_string()));
    }

    let claims = Claims::new(username.to_string(), scopes);
    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

    Ok(Token {
        access_token,
        token_type: "bearer".to_string(),
    })
}

pub fn decode_token(token: &str) -> Result<Claims, AuthError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AuthError::InvalidToken)?;

    Ok(token_data.claims)
}
