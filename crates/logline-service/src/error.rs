//! Error types for logline-service

use std::time::Duration;

use logline_core::BackendError;
use logline_storage::RepositoryError;
use thiserror::Error;

/// Errors returned by the log service
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The request cannot be turned into a log line
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The repository did not answer within the call timeout
    #[error("Timed out after {timeout:?} while trying to {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ServiceError {
    /// Create a new InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status code for this error
    ///
    /// - Invalid request or reserved key: 400
    /// - Missing key: 404
    /// - Counter missing or backend unavailable: 503
    /// - Timeout: 504
    /// - Anything else: 500
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Timeout { .. } => 504,
            Self::Repository(e) if e.is_not_found() => 404,
            Self::Repository(RepositoryError::ReservedKey(_)) => 400,
            Self::Repository(
                RepositoryError::CounterNotInitialized
                | RepositoryError::CounterUnavailable
                | RepositoryError::Backend {
                    source: BackendError::Unavailable(_),
                    ..
                }
                | RepositoryError::TxLog {
                    source: BackendError::Unavailable(_),
                    ..
                },
            ) => 503,
            Self::Repository(_) => 500,
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
