use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    // Registration-time configuration errors
    #[error("resource '{0}' declares no primary key")]
    NoPrimaryKey(String),

    #[error("resource '{0}' declares duplicate field '{1}'")]
    DuplicateField(String, String),

    #[error("resource '{0}': field '{1}' has a kind not usable as a primary key")]
    UnsupportedKeyKind(String, String),

    // Request-time errors (translated to 400 at the handler boundary)
    #[error("invalid value '{value}' for key field '{field}'")]
    InvalidKeySegment { field: String, value: String },

    #[error("unknown sort field '{0}'")]
    UnknownSortField(String),

    #[error("expected {expected} key segments, got {got}")]
    KeyArityMismatch { expected: usize, got: usize },
}
