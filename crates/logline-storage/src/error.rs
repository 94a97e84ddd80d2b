//! Error types for logline-storage

use logline_core::{BackendError, CounterError};
use thiserror::Error;

/// Errors returned by the log-line repository
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The counter key has never been written (first run)
    #[error("Log line counter not initialized")]
    CounterNotInitialized,

    /// The counter key is missing when a write needs it
    #[error("Log line counter unavailable, was the repository initialized?")]
    CounterUnavailable,

    /// The counter key holds something that is not an 8-byte counter
    #[error("Invalid log line counter: {0}")]
    InvalidCounter(#[from] CounterError),

    /// A backend call about one key failed
    #[error("Unable to {operation} {key:?}: {source}")]
    Backend {
        operation: &'static str,
        key: String,
        source: BackendError,
    },

    /// A transaction log call failed
    #[error("Unable to {operation} transaction log: {source}")]
    TxLog {
        operation: &'static str,
        source: BackendError,
    },

    /// The line uses the reserved counter key
    #[error("Key {0:?} is reserved")]
    ReservedKey(String),

    /// The primary write committed but the bucket index write failed
    #[error("Unable to index key {key} in bucket {bucket}: {source}")]
    IndexWrite {
        bucket: String,
        key: String,
        source: BackendError,
    },

    /// A bucket index member has no primary value
    #[error("Key {key} indexed in bucket {bucket} is missing from storage")]
    MissingIndexedLine { bucket: String, key: String },
}

impl RepositoryError {
    /// Wrap a backend error with the operation and key it concerns
    pub fn backend(operation: &'static str, key: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            operation,
            key: key.into(),
            source,
        }
    }

    /// Wrap a transaction log error
    pub fn tx_log(operation: &'static str, source: BackendError) -> Self {
        Self::TxLog { operation, source }
    }

    /// Create a new IndexWrite error
    pub fn index_write(
        bucket: impl Into<String>,
        key: impl Into<String>,
        source: BackendError,
    ) -> Self {
        Self::IndexWrite {
            bucket: bucket.into(),
            key: key.into(),
            source,
        }
    }

    /// Whether the wrapped backend error reports a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend { source, .. } if source.is_not_found())
    }
}

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
