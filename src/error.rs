// HTTP API Error Types
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request (disabled principal, malformed key segment, bad sort field)
    BadRequest(String),

    // 401 Unauthorized - carries the WWW-Authenticate challenge naming the
    // scopes the operation requires. Insufficient scope is deliberately kept at
    // 401 rather than 403 to match the existing clients.
    Unauthorized { message: String, challenge: String },

    // 404 Not Found
    NotFound(String),

    // 422 Unprocessable Entity (duplicate create, failed validation)
    UnprocessableEntity(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable (store/connection failures)
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized { .. } => 401,
            ApiError::NotFound(_) => 404,
            ApiError::UnprocessableEntity(_) => 422,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::UnprocessableEntity(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized { .. } => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    /// Build a `WWW-Authenticate` challenge naming the required scopes
    pub fn bearer_challenge(scopes: &[String]) -> String {
        if scopes.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer scope=\"{}\"", scopes.join(" "))
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>, scopes: &[String]) -> Self {
        ApiError::Unauthorized {
            message: message.into(),
            challenge: Self::bearer_challenge(scopes),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        ApiError::UnprocessableEntity(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Record not found"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::error!("Database connection error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            other => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;
        match err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::InsufficientScope => {
                ApiError::unauthorized(err.to_string(), &[])
            }
            AuthError::InvalidCredentials | AuthError::Disabled => {
                ApiError::bad_request(err.to_string())
            }
            AuthError::TokenGeneration(msg) => {
                tracing::error!("JWT generation error: {}", msg);
                ApiError::internal_server_error("Failed to issue token")
            }
            AuthError::Store(sqlx_err) => ApiError::from(sqlx_err),
        }
    }
}

impl From<crate::resource::ResourceError> for ApiError {
    fn from(err: crate::resource::ResourceError) -> Self {
        use crate::resource::ResourceError;
        match err {
            ResourceError::InvalidKeySegment { .. } | ResourceError::UnknownSortField(_) => {
                ApiError::bad_request(err.to_string())
            }
            // Descriptor problems are registration-time configuration errors;
            // reaching here from a request path means something is badly wired.
            other => {
                tracing::error!("Resource configuration error: {}", other);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = self.to_json();

        if let ApiError::Unauthorized { challenge, .. } = &self {
            return (
                status,
                [(header::WWW_AUTHENTICATE, challenge.clone())],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}
