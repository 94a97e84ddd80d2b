//! Error types for logline-logging

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while installing the tracing subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unable to create log directory {path:?}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },

    #[error("Unable to create log file {path:?}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("Unable to create rolling log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("Invalid log filter {directives:?}: {reason}")]
    InvalidFilter { directives: String, reason: String },

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Result type alias for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
