//! Repository configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default retry budget for [`ConflictPolicy::RetryCounterRace`]
pub const DEFAULT_MAX_COUNTER_RETRIES: u32 = 8;

/// How an add resolves a precondition conflict
///
/// A conflict on the create-and-count write means either the key already
/// existed or another writer moved the counter in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Always fall back to an unconditional write of the line
    ///
    /// Concurrent creators of distinct keys can under-count.
    #[default]
    FallbackToUpdate,
    /// Check whether the key exists; if it does not, the counter raced, so
    /// re-read it and retry up to `max_retries` times before falling back
    RetryCounterRace { max_retries: u32 },
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FallbackToUpdate => write!(f, "fallback_to_update"),
            Self::RetryCounterRace { max_retries } => {
                write!(f, "retry_counter_race:{max_retries}")
            }
        }
    }
}

/// Error parsing a [`ConflictPolicy`] from text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid conflict policy: {0}")]
pub struct ParsePolicyError(String);

impl FromStr for ConflictPolicy {
    type Err = ParsePolicyError;

    /// Accepts `fallback_to_update`, `retry_counter_race` or
    /// `retry_counter_race:<max retries>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            None if s.trim() == "fallback_to_update" => Ok(Self::FallbackToUpdate),
            None if s.trim() == "retry_counter_race" => Ok(Self::RetryCounterRace {
                max_retries: DEFAULT_MAX_COUNTER_RETRIES,
            }),
            Some(("retry_counter_race", retries)) => retries
                .parse()
                .map(|max_retries| Self::RetryCounterRace { max_retries })
                .map_err(|_| ParsePolicyError(s.to_string())),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// How much a committed atomic batch advances the counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCounterMode {
    /// One increment per committed batch, whatever its size
    #[default]
    OnePerBatch,
    /// One increment per line of the committed batch
    OnePerLine,
}

/// Configuration for a log-line repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Conflict resolution for single-line adds
    pub conflict_policy: ConflictPolicy,
    /// Counter advance for atomic batches
    pub batch_counter_mode: BatchCounterMode,
}

impl RepositoryConfig {
    /// Set the conflict policy
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set the batch counter mode
    pub fn with_batch_counter_mode(mut self, mode: BatchCounterMode) -> Self {
        self.batch_counter_mode = mode;
        self
    }

    /// Counter advance for a committed atomic batch of `lines` lines
    pub fn batch_increment(&self, lines: usize) -> u64 {
        match self.batch_counter_mode {
            BatchCounterMode::OnePerBatch => 1,
            BatchCounterMode::OnePerLine => lines as u64,
        }
    }
}
