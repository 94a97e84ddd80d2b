//! # Logline Storage
//!
//! Log-line repository for the logline store.
//!
//! This crate maps log-line operations onto precondition-guarded calls
//! against any [`logline_core::VersionedKvStore`], and ships an in-memory
//! engine implementing that trait for tests and local runs.
//!
//! ## Features
//!
//! - **LogLineRepository**: add, batch add, count, history, key/prefix/bucket
//!   lookups and "last N transactions" over a versioned backend
//! - **ConflictPolicy**: how a conflicting create is resolved
//! - **InMemoryVersionedStore**: transaction-log engine with fault injection
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logline_core::LogLine;
//! use logline_storage::{InMemoryVersionedStore, LogLineRepository, RepositoryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryVersionedStore::new());
//!     let repo = LogLineRepository::new(store, RepositoryConfig::default());
//!     repo.initialize().await.unwrap();
//!
//!     repo.add(&LogLine::new("foo_0", "fake value")).await.unwrap();
//!     assert_eq!(repo.count().await.unwrap(), 1);
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod memory;
pub mod repository;

// Re-exports
pub use batch::{BatchPath, BatchPhase, BatchReport, LineReport};
pub use config::{
    BatchCounterMode, ConflictPolicy, DEFAULT_MAX_COUNTER_RETRIES, ParsePolicyError,
    RepositoryConfig,
};
pub use error::{RepositoryError, RepositoryResult};
pub use memory::InMemoryVersionedStore;
pub use repository::{AddOutcome, LogLineRepository};
