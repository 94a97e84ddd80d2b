//! Versioned key-value backend contract
//!
//! The repository needs only a handful of capabilities from the storage
//! engine: point reads carrying a version token, unconditional writes,
//! atomic multi-key writes guarded by preconditions, prefix scans, per-key
//! history, transaction-log scans, and a sorted set per bucket.
//!
//! Implementations own durability and commit-time precondition checks. The
//! repository never locks; a write whose preconditions fail must be rejected
//! with [`BackendError::Conflict`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Transaction identifier assigned to every committed write
///
/// Monotonically increasing. Also serves as the version token for
/// [`Precondition::KeyNotModifiedAfter`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display("tx#{_0}")]
pub struct TxId(pub u64);

impl TxId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A key/value pair as stored by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl KeyValue {
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of a point read: the value plus the transaction that wrote it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub key: Bytes,
    pub value: Bytes,
    pub tx: TxId,
}

/// One entry of a key's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub key: Bytes,
    pub value: Bytes,
    pub tx: TxId,
    /// 1-based revision number of the key
    pub revision: u64,
}

/// All entries written by one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEntries {
    pub id: TxId,
    pub entries: Vec<KeyValue>,
}

/// A sorted-set member with its score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub score: i64,
    pub member: Bytes,
}

/// Condition checked atomically when a multi-key write commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The key must not exist yet
    KeyMustNotExist(Bytes),
    /// The key must not have been written after `tx`
    KeyNotModifiedAfter { key: Bytes, tx: TxId },
}

impl Precondition {
    pub fn key_must_not_exist(key: impl Into<Bytes>) -> Self {
        Self::KeyMustNotExist(key.into())
    }

    pub fn key_not_modified_after(key: impl Into<Bytes>, tx: TxId) -> Self {
        Self::KeyNotModifiedAfter {
            key: key.into(),
            tx,
        }
    }
}

/// Capability set of the versioned key-value engine
#[async_trait]
pub trait VersionedKvStore: Send + Sync {
    /// Point read
    ///
    /// Returns [`BackendError::NotFound`] when the key was never written.
    async fn get(&self, key: &[u8]) -> Result<VersionedValue, BackendError>;

    /// Unconditional single-key write
    async fn set(&self, key: &[u8], value: Bytes) -> Result<TxId, BackendError>;

    /// Atomic multi-key write
    ///
    /// Either every entry commits in one transaction or none does. Returns
    /// [`BackendError::Conflict`] if any precondition fails.
    async fn set_all(
        &self,
        entries: Vec<KeyValue>,
        preconditions: Vec<Precondition>,
    ) -> Result<TxId, BackendError>;

    /// Current value of every key starting with `prefix`, in key order
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, BackendError>;

    /// Every revision of `key`, oldest first
    async fn history(&self, key: &[u8]) -> Result<Vec<HistoryEntry>, BackendError>;

    /// Id of the latest committed transaction
    async fn current_tx_id(&self) -> Result<TxId, BackendError>;

    /// Up to `limit` transactions starting at `from`
    ///
    /// With `descending` the scan walks from `from` towards older
    /// transactions. Keys in the returned entries may carry NUL padding.
    async fn scan_transactions(
        &self,
        from: TxId,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<TxEntries>, BackendError>;

    /// Insert or rescore `member` in the sorted set `set`
    async fn sorted_set_add(
        &self,
        set: &str,
        score: i64,
        member: &[u8],
    ) -> Result<(), BackendError>;

    /// Every member of `set`, lowest score first
    async fn sorted_set_scan(&self, set: &str) -> Result<Vec<ScoredMember>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the VersionedKvStore trait is object-safe
    fn _assert_object_safe(_: &dyn VersionedKvStore) {}

    #[test]
    fn test_tx_id_ordering_and_display() {
        assert!(TxId(2) > TxId(1));
        assert_eq!(TxId(7).to_string(), "tx#7");
        assert_eq!(TxId::default().as_u64(), 0);
    }

    #[test]
    fn test_precondition_constructors() {
        let pre = Precondition::key_must_not_exist("foo_0");
        assert_eq!(pre, Precondition::KeyMustNotExist(Bytes::from_static(b"foo_0")));

        let pre = Precondition::key_not_modified_after("log_size", TxId(3));
        assert!(matches!(
            pre,
            Precondition::KeyNotModifiedAfter { tx: TxId(3), .. }
        ));
    }
}
