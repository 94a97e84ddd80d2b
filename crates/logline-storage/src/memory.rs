//! In-memory versioned key-value engine
//!
//! Reference implementation of [`VersionedKvStore`] for tests and local
//! runs. Every write is a transaction with a monotonically increasing id,
//! every key keeps its full revision list, and multi-key writes check their
//! preconditions under the same lock that commits them.
//!
//! Transaction scans return keys prefixed with a NUL byte, the way real
//! engines expose their internal key encoding; disable with
//! [`InMemoryVersionedStore::without_key_padding`].

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use logline_core::{
    BackendError, HistoryEntry, KeyValue, Precondition, ScoredMember, TxEntries, TxId,
    VersionedKvStore, VersionedValue, sanitize_key,
};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// One committed value of a key
#[derive(Debug, Clone)]
struct Revision {
    value: Bytes,
    tx: TxId,
}

#[derive(Debug, Default)]
struct KvState {
    /// Revisions per key, oldest first
    keys: BTreeMap<Bytes, Vec<Revision>>,
    /// Committed transactions; transaction `n` lives at index `n - 1`
    txs: Vec<TxEntries>,
}

impl KvState {
    fn last_tx(&self) -> TxId {
        TxId(self.txs.len() as u64)
    }

    fn commit(&mut self, entries: Vec<KeyValue>) -> TxId {
        let tx = TxId(self.txs.len() as u64 + 1);
        for entry in &entries {
            self.keys
                .entry(entry.key.clone())
                .or_default()
                .push(Revision {
                    value: entry.value.clone(),
                    tx,
                });
        }
        self.txs.push(TxEntries { id: tx, entries });
        tx
    }

    fn check(&self, precondition: &Precondition) -> Result<(), BackendError> {
        match precondition {
            Precondition::KeyMustNotExist(key) => {
                if self.keys.contains_key(key) {
                    return Err(BackendError::conflict(format!(
                        "key {} already exists",
                        sanitize_key(key)
                    )));
                }
            }
            Precondition::KeyNotModifiedAfter { key, tx } => {
                let last = self
                    .keys
                    .get(key)
                    .and_then(|revisions| revisions.last())
                    .map(|revision| revision.tx);
                if let Some(last) = last
                    && last > *tx
                {
                    return Err(BackendError::conflict(format!(
                        "key {} modified at {last}, after {tx}",
                        sanitize_key(key)
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Switches for exercising failure paths
#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_index_writes: AtomicBool,
    rejected_index_members: DashSet<Bytes>,
    forced_conflicts: AtomicUsize,
    latency_ms: AtomicU64,
}

/// In-memory implementation of VersionedKvStore
///
/// Uses one `RwLock` over the key space and transaction log so multi-key
/// writes are atomic, and a `DashMap` of sorted sets for bucket indexes.
#[derive(Debug)]
pub struct InMemoryVersionedStore {
    state: RwLock<KvState>,
    /// Sorted sets: set name -> member -> score
    sorted_sets: DashMap<String, BTreeMap<Bytes, i64>>,
    pad_tx_keys: bool,
    faults: Faults,
}

impl Default for InMemoryVersionedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVersionedStore {
    /// Create an empty engine
    pub fn new() -> Self {
        Self {
            state: RwLock::new(KvState::default()),
            sorted_sets: DashMap::new(),
            pad_tx_keys: true,
            faults: Faults::default(),
        }
    }

    /// Return transaction-scan keys exactly as written
    pub fn without_key_padding(mut self) -> Self {
        self.pad_tx_keys = false;
        self
    }

    /// Make every call fail with [`BackendError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make sorted-set writes fail with [`BackendError::Unavailable`]
    pub fn set_fail_index_writes(&self, fail: bool) {
        self.faults.fail_index_writes.store(fail, Ordering::SeqCst);
    }

    /// Make sorted-set writes of `member` fail, in any set
    pub fn reject_index_member(&self, member: impl Into<Bytes>) {
        self.faults.rejected_index_members.insert(member.into());
    }

    /// Reject the next `count` multi-key writes with a conflict
    pub fn force_conflicts(&self, count: usize) {
        self.faults.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.faults.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of committed transactions
    pub async fn tx_count(&self) -> usize {
        self.state.read().await.txs.len()
    }

    async fn admit(&self) -> Result<(), BackendError> {
        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("in-memory engine switched off"));
        }
        Ok(())
    }

    fn take_forced_conflict(&self) -> bool {
        self.faults
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn padded(&self, key: &Bytes) -> Bytes {
        if !self.pad_tx_keys {
            return key.clone();
        }
        let mut buf = BytesMut::with_capacity(key.len() + 1);
        buf.put_u8(0);
        buf.put_slice(key);
        buf.freeze()
    }
}

#[async_trait]
impl VersionedKvStore for InMemoryVersionedStore {
    async fn get(&self, key: &[u8]) -> Result<VersionedValue, BackendError> {
        self.admit().await?;
        let state = self.state.read().await;
        let (stored_key, revisions) = state
            .keys
            .get_key_value(key)
            .ok_or_else(|| BackendError::not_found(sanitize_key(key)))?;
        let latest = revisions
            .last()
            .ok_or_else(|| BackendError::not_found(sanitize_key(key)))?;
        Ok(VersionedValue {
            key: stored_key.clone(),
            value: latest.value.clone(),
            tx: latest.tx,
        })
    }

    async fn set(&self, key: &[u8], value: Bytes) -> Result<TxId, BackendError> {
        self.admit().await?;
        let mut state = self.state.write().await;
        let tx = state.commit(vec![KeyValue::new(Bytes::copy_from_slice(key), value)]);
        trace!(key = %sanitize_key(key), %tx, "Set key");
        Ok(tx)
    }

    async fn set_all(
        &self,
        entries: Vec<KeyValue>,
        preconditions: Vec<Precondition>,
    ) -> Result<TxId, BackendError> {
        self.admit().await?;
        if entries.is_empty() {
            return Err(BackendError::Corrupted("empty transaction".to_string()));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        if let Some(duplicate) = entries.iter().find(|e| !seen.insert(e.key.clone())) {
            return Err(BackendError::conflict(format!(
                "key {} written twice in one transaction",
                sanitize_key(&duplicate.key)
            )));
        }

        let mut state = self.state.write().await;
        if self.take_forced_conflict() {
            debug!("Rejecting transaction with forced conflict");
            return Err(BackendError::conflict("forced conflict"));
        }
        for precondition in &preconditions {
            state.check(precondition)?;
        }

        let keys = entries.len();
        let tx = state.commit(entries);
        trace!(%tx, keys, "Committed multi-key transaction");
        Ok(tx)
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KeyValue>, BackendError> {
        self.admit().await?;
        let state = self.state.read().await;
        let start = Bytes::copy_from_slice(prefix);
        Ok(state
            .keys
            .range(start..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter_map(|(key, revisions)| {
                revisions
                    .last()
                    .map(|latest| KeyValue::new(key.clone(), latest.value.clone()))
            })
            .collect())
    }

    async fn history(&self, key: &[u8]) -> Result<Vec<HistoryEntry>, BackendError> {
        self.admit().await?;
        let state = self.state.read().await;
        let (stored_key, revisions) = state
            .keys
            .get_key_value(key)
            .ok_or_else(|| BackendError::not_found(sanitize_key(key)))?;
        Ok(revisions
            .iter()
            .enumerate()
            .map(|(i, revision)| HistoryEntry {
                key: stored_key.clone(),
                value: revision.value.clone(),
                tx: revision.tx,
                revision: i as u64 + 1,
            })
            .collect())
    }

    async fn current_tx_id(&self) -> Result<TxId, BackendError> {
        self.admit().await?;
        Ok(self.state.read().await.last_tx())
    }

    async fn scan_transactions(
        &self,
        from: TxId,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<TxEntries>, BackendError> {
        self.admit().await?;
        let state = self.state.read().await;
        let last = state.last_tx().as_u64();
        let from = from.as_u64().min(last);

        let ids: Box<dyn Iterator<Item = u64>> = if descending {
            Box::new((1..=from).rev())
        } else {
            Box::new(from.max(1)..=last)
        };

        Ok(ids
            .take(limit)
            .filter_map(|id| state.txs.get(id as usize - 1))
            .map(|tx| TxEntries {
                id: tx.id,
                entries: tx
                    .entries
                    .iter()
                    .map(|entry| KeyValue::new(self.padded(&entry.key), entry.value.clone()))
                    .collect(),
            })
            .collect())
    }

    async fn sorted_set_add(
        &self,
        set: &str,
        score: i64,
        member: &[u8],
    ) -> Result<(), BackendError> {
        self.admit().await?;
        if self.faults.fail_index_writes.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("index writes switched off"));
        }
        if self.faults.rejected_index_members.contains(member) {
            return Err(BackendError::unavailable(format!(
                "index writes of {} switched off",
                sanitize_key(member)
            )));
        }
        self.sorted_sets
            .entry(set.to_string())
            .or_default()
            .insert(Bytes::copy_from_slice(member), score);
        trace!(set, score, member = %sanitize_key(member), "Added sorted set member");
        Ok(())
    }

    async fn sorted_set_scan(&self, set: &str) -> Result<Vec<ScoredMember>, BackendError> {
        self.admit().await?;
        let mut members: Vec<ScoredMember> = match self.sorted_sets.get(set) {
            Some(entries) => entries
                .iter()
                .map(|(member, score)| ScoredMember {
                    score: *score,
                    member: member.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        members.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.member.cmp(&b.member)));
        Ok(members)
    }
}
