//! Error types for the logline core

use thiserror::Error;

/// Errors reported by a versioned key-value backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The requested key has never been written
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A precondition of a multi-key write no longer held at commit time
    #[error("Precondition violated: {0}")]
    Conflict(String),

    /// The backend could not be reached or refused the call
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend returned data that could not be interpreted
    #[error("Corrupted response: {0}")]
    Corrupted(String),
}

impl BackendError {
    /// Create a new NotFound error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create a new Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Whether this error is a precondition conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether this error reports a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors decoding the total-lines counter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CounterError {
    #[error("Invalid counter length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Counter overflow at {0}")]
    Overflow(u64),
}

/// Result type alias for backend calls
pub type BackendResult<T> = Result<T, BackendError>;
