//! Batch add state machine and report
//!
//! ```text
//! AttemptAtomic --committed--> Done
//!       |
//!   conflict
//!       v
//! ConflictDetected --> FallbackSequential --> Done
//! ```
//!
//! Any other failure of the atomic attempt aborts the batch with an error
//! before the fallback is reached.

use crate::error::RepositoryError;
use crate::repository::AddOutcome;

/// Phase of a batch add
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    AttemptAtomic,
    ConflictDetected,
    FallbackSequential,
    Done,
}

/// What happened in the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchEvent {
    /// The atomic transaction committed
    Committed,
    /// The atomic transaction failed a precondition
    Conflict,
    /// The sequential fallback processed every line
    FallbackFinished,
}

impl BatchPhase {
    /// Next phase after `event`
    ///
    /// Events that do not apply to the current phase leave it unchanged.
    pub fn on(self, event: BatchEvent) -> BatchPhase {
        match (self, event) {
            (Self::AttemptAtomic, BatchEvent::Committed) => Self::Done,
            (Self::AttemptAtomic, BatchEvent::Conflict) => Self::ConflictDetected,
            (Self::ConflictDetected, _) => Self::FallbackSequential,
            (Self::FallbackSequential, BatchEvent::FallbackFinished) => Self::Done,
            (phase, _) => phase,
        }
    }
}

/// Which path persisted the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPath {
    /// Nothing to write
    Empty,
    /// One transaction for every line plus the counter
    Atomic,
    /// Line by line after a conflict
    Fallback,
}

impl BatchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Atomic => "atomic",
            Self::Fallback => "fallback",
        }
    }
}

/// Outcome of one line of a batch
#[derive(Debug, Clone)]
pub struct LineReport {
    pub key: String,
    pub result: Result<AddOutcome, RepositoryError>,
    /// Set when the line was persisted but its bucket index write failed
    pub index_error: Option<RepositoryError>,
}

/// Outcome of a batch add, one entry per line in batch order
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub path: BatchPath,
    pub lines: Vec<LineReport>,
}

impl BatchReport {
    pub(crate) fn new(path: BatchPath) -> Self {
        Self {
            path,
            lines: Vec::new(),
        }
    }

    pub(crate) fn record(
        &mut self,
        key: impl Into<String>,
        result: Result<AddOutcome, RepositoryError>,
    ) {
        self.lines.push(LineReport {
            key: key.into(),
            result,
            index_error: None,
        });
    }

    /// Keys that were persisted
    pub fn persisted_keys(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| line.result.is_ok())
            .map(|line| line.key.as_str())
    }

    /// Lines whose write failed
    pub fn failures(&self) -> impl Iterator<Item = &LineReport> {
        self.lines.iter().filter(|line| line.result.is_err())
    }

    /// Whether every line was persisted
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Persisted lines missing from their bucket index
    pub fn index_failures(&self) -> impl Iterator<Item = &LineReport> {
        self.lines.iter().filter(|line| line.index_error.is_some())
    }

    /// The first index failure, if any
    ///
    /// Primary writes are durable either way; this only reports whether
    /// every bucketed line also reached its index.
    pub fn index_result(&self) -> Result<(), RepositoryError> {
        match self.index_failures().find_map(|line| line.index_error.clone()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
