use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::AuthProvider;

/// Shared application state: the connection pool plus the injected
/// authentication provider. Everything else is request-scoped.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(pool: PgPool, auth: Arc<dyn AuthProvider>) -> Self {
        Self { pool, auth }
    }
}
