//! Domain errors for the strategy selection engine.

use thiserror::Error;

/// Domain-level errors that can occur in the engine and its adapters.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl DomainError {
    /// Whether the error means the backing store has not been created yet,
    /// which hydration treats as an ordinary cold start.
    pub fn is_missing_store(&self) -> bool {
        match self {
            Self::DatabaseError(msg) => msg.contains("no such table"),
            _ => false,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
