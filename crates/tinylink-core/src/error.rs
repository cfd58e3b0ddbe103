use thiserror::Error;

/// Errors returned by repository implementations.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

/// Errors returned by short code generators.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),
}

/// Errors surfaced by the shortener to its callers.
///
/// A create that hits existing content is not an error; see
/// [`Shortened::AlreadyExists`](crate::shortener::Shortened::AlreadyExists).
#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code was deleted: {0}")]
    Gone(String),
    #[error("short code generation failed: {0}")]
    EntropyUnavailable(String),
    #[error("generated short code collided: {0}")]
    TokenCollision(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<GeneratorError> for ShortenerError {
    fn from(value: GeneratorError) -> Self {
        match value {
            GeneratorError::EntropyUnavailable(message) => Self::EntropyUnavailable(message),
        }
    }
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(code) => Self::TokenCollision(code),
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}
