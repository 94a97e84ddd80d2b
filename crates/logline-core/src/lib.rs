//! # Logline Core
//!
//! Core types, traits, and errors for the logline store.
//!
//! The log-line repository sits on top of an external versioned key-value
//! engine. This crate defines the narrow contract that engine must satisfy
//! and the value objects that flow through it, so the repository logic can
//! run against a production client or an in-memory engine unchanged.
//!
//! ## Key Traits
//!
//! - [`VersionedKvStore`]: precondition-guarded writes, history, transaction
//!   scans and sorted-set indexes
//!
//! ## Key Types
//!
//! - [`LogLine`]: one stored record (key, value, optional bucket and time)
//! - [`LogLineHistory`]: every recorded revision of a key
//! - [`LineCounter`]: the 8-byte big-endian total-lines counter
//! - [`TxId`]: backend transaction identifier, doubling as a version token

pub mod backend;
pub mod counter;
pub mod error;
pub mod key;
pub mod line;

// Re-export main types
pub use backend::*;
pub use counter::*;
pub use error::*;
pub use key::*;
pub use line::*;
