//! Log-line repository
//!
//! Turns log-line operations into precondition-guarded calls against a
//! [`VersionedKvStore`]. The repository keeps no state of its own: the
//! total-lines counter, the lines and the bucket indexes all live in the
//! backend, and concurrent writers are coordinated only by the backend's
//! commit-time precondition checks.
//!
//! A new key and the incremented counter are written in one transaction
//! guarded by "key must not exist" and "counter not modified since read".
//! When that transaction conflicts, the configured [`ConflictPolicy`]
//! decides how the line is persisted.

use std::sync::Arc;

use bytes::Bytes;
use chrono::DateTime;
use logline_core::{
    COUNTER_KEY, KeyValue, LineCounter, LogLine, LogLineHistory, LogLineRevision, Precondition,
    TxId, VersionedKvStore, is_counter_key, sanitize_key,
};
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchEvent, BatchPath, BatchPhase, BatchReport};
use crate::config::{ConflictPolicy, RepositoryConfig};
use crate::error::{RepositoryError, RepositoryResult};

/// How an add persisted its line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// New key; the counter was incremented in the same transaction
    Created,
    /// The key already existed; value replaced, counter untouched
    Updated,
    /// Conflict resolved by an unconditional write without checking why it
    /// happened; the key may have been new, in which case it is not counted
    Overwritten,
    /// The key was new but the counter kept racing past the retry budget;
    /// written without counting
    CounterRaceLost,
}

impl AddOutcome {
    /// Whether the counter accounts for this line
    pub fn counted(&self) -> bool {
        matches!(self, Self::Created)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Overwritten => "overwritten",
            Self::CounterRaceLost => "counter_race_lost",
        }
    }
}

enum ConflictResolution {
    Overwrite,
    Update,
    Retry,
    GiveUp,
}

/// Repository of log lines over a versioned key-value backend
pub struct LogLineRepository<S> {
    store: Arc<S>,
    config: RepositoryConfig,
}

impl<S> Clone for LogLineRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: VersionedKvStore> LogLineRepository<S> {
    /// Create a repository over `store`
    pub fn new(store: Arc<S>, config: RepositoryConfig) -> Self {
        Self { store, config }
    }

    /// The backend
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Ensure the counter key exists
    ///
    /// Idempotent. Two concurrent first-run initializers both write zero.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> RepositoryResult<()> {
        match self.count().await {
            Ok(total) => {
                debug!(total, "Log line counter already initialized");
                Ok(())
            }
            Err(RepositoryError::CounterNotInitialized) => {
                self.store
                    .set(COUNTER_KEY.as_bytes(), LineCounter::ZERO.encode())
                    .await
                    .map_err(|e| RepositoryError::backend("initialize", COUNTER_KEY, e))?;
                info!("Initialized log line counter");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Total number of distinct lines created
    pub async fn count(&self) -> RepositoryResult<u64> {
        match self.store.get(COUNTER_KEY.as_bytes()).await {
            Ok(raw) => Ok(LineCounter::decode(&raw.value)?.value()),
            Err(e) if e.is_not_found() => Err(RepositoryError::CounterNotInitialized),
            Err(e) => Err(RepositoryError::backend("count", COUNTER_KEY, e)),
        }
    }

    /// Persist one line, counting it if its key is new
    ///
    /// After the primary write, lines with a bucket are added to the bucket
    /// index. An index failure is returned as an error even though the line
    /// itself is already stored.
    #[instrument(skip(self, line), fields(key = %line.key()))]
    pub async fn add(&self, line: &LogLine) -> RepositoryResult<AddOutcome> {
        ensure_not_reserved(line)?;
        let outcome = self.write_line(line).await?;
        self.index_line(line).await?;
        Ok(outcome)
    }

    /// Persist a batch of lines
    ///
    /// All lines go into one transaction together with the counter when
    /// every key is new; the counter advances as configured by
    /// [`crate::BatchCounterMode`] (by one per batch by default). On a
    /// conflict every line is written on its own, in batch order, with the
    /// single-line conflict handling; per-line failures are recorded in the
    /// report instead of aborting the batch. Every persisted bucketed line
    /// gets its index write, and index failures are recorded on the line
    /// (see [`BatchReport::index_result`]).
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn add_batch(&self, lines: &[LogLine]) -> RepositoryResult<BatchReport> {
        if lines.is_empty() {
            return Ok(BatchReport::new(BatchPath::Empty));
        }
        for line in lines {
            ensure_not_reserved(line)?;
        }

        let mut report = BatchReport::new(BatchPath::Atomic);
        let mut phase = BatchPhase::AttemptAtomic;
        while phase != BatchPhase::Done {
            phase = match phase {
                BatchPhase::AttemptAtomic => {
                    let event = self.commit_batch(lines).await?;
                    if event == BatchEvent::Committed {
                        for line in lines {
                            report.record(line.key(), Ok(AddOutcome::Created));
                        }
                    }
                    phase.on(event)
                }
                BatchPhase::ConflictDetected => {
                    warn!("Batch precondition failed, writing lines one by one");
                    report = BatchReport::new(BatchPath::Fallback);
                    phase.on(BatchEvent::Conflict)
                }
                BatchPhase::FallbackSequential => {
                    for line in lines {
                        let result = self.write_line(line).await;
                        if let Err(e) = &result {
                            warn!(key = line.key(), error = %e, "Batch line failed");
                        }
                        report.record(line.key(), result);
                    }
                    phase.on(BatchEvent::FallbackFinished)
                }
                BatchPhase::Done => phase,
            };
        }

        for (line, entry) in lines.iter().zip(report.lines.iter_mut()) {
            if entry.result.is_err() {
                continue;
            }
            if let Err(e) = self.index_line(line).await {
                warn!(key = line.key(), error = %e, "Batch line not indexed");
                entry.index_error = Some(e);
            }
        }
        Ok(report)
    }

    /// Every revision of `key`, oldest first
    pub async fn history(&self, key: &str) -> RepositoryResult<LogLineHistory> {
        let entries = self
            .store
            .history(key.as_bytes())
            .await
            .map_err(|e| RepositoryError::backend("read history of", key, e))?;

        let revisions = entries
            .into_iter()
            .filter(|entry| !is_counter_key(&entry.key))
            .map(|entry| LogLineRevision {
                value: entry.value,
                tx: entry.tx,
                revision: entry.revision,
            })
            .collect();

        Ok(LogLineHistory {
            key: sanitize_key(key.as_bytes()),
            revisions,
        })
    }

    /// Current value of `key`
    pub async fn get_by_key(&self, key: &str) -> RepositoryResult<LogLine> {
        let found = self
            .store
            .get(key.as_bytes())
            .await
            .map_err(|e| RepositoryError::backend("get", key, e))?;
        Ok(LogLine::new(sanitize_key(&found.key), found.value))
    }

    /// Every line whose key starts with `prefix`
    ///
    /// Returned verbatim: an empty prefix includes the counter key.
    pub async fn get_by_prefix(&self, prefix: &str) -> RepositoryResult<Vec<LogLine>> {
        let entries = self
            .store
            .scan_prefix(prefix.as_bytes())
            .await
            .map_err(|e| RepositoryError::backend("scan prefix", prefix, e))?;
        Ok(entries
            .into_iter()
            .map(|entry| LogLine::new(sanitize_key(&entry.key), entry.value))
            .collect())
    }

    /// Every line indexed under `bucket`, oldest timestamp first
    pub async fn get_by_bucket(&self, bucket: &str) -> RepositoryResult<Vec<LogLine>> {
        let members = self
            .store
            .sorted_set_scan(bucket)
            .await
            .map_err(|e| RepositoryError::backend("scan bucket", bucket, e))?;

        let mut lines = Vec::with_capacity(members.len());
        for member in members {
            let key = sanitize_key(&member.member);
            let found = match self.store.get(key.as_bytes()).await {
                Ok(found) => found,
                Err(e) if e.is_not_found() => {
                    return Err(RepositoryError::MissingIndexedLine {
                        bucket: bucket.to_string(),
                        key,
                    });
                }
                Err(e) => return Err(RepositoryError::backend("get", key, e)),
            };
            lines.push(LogLine::with_bucket(
                bucket,
                key,
                found.value,
                DateTime::from_timestamp_nanos(member.score),
            ));
        }
        Ok(lines)
    }

    /// Lines touched by the last `n` transactions, newest transaction first
    ///
    /// Counts transactions, not lines: the counter is skipped, so the
    /// result may hold fewer than `n` lines.
    pub async fn get_last_n_log_lines(&self, n: usize) -> RepositoryResult<Vec<LogLine>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let head = self
            .store
            .current_tx_id()
            .await
            .map_err(|e| RepositoryError::tx_log("read head of", e))?;
        let txs = self
            .store
            .scan_transactions(head, n, true)
            .await
            .map_err(|e| RepositoryError::tx_log("scan", e))?;

        let mut lines = Vec::new();
        for tx in txs {
            for entry in tx.entries {
                let key = sanitize_key(&entry.key);
                if key == COUNTER_KEY {
                    continue;
                }
                let found = self
                    .store
                    .get(key.as_bytes())
                    .await
                    .map_err(|e| RepositoryError::backend("get", &key, e))?;
                lines.push(LogLine::new(key, found.value));
            }
        }
        Ok(lines)
    }

    async fn read_counter(&self) -> RepositoryResult<(LineCounter, TxId)> {
        match self.store.get(COUNTER_KEY.as_bytes()).await {
            Ok(raw) => Ok((LineCounter::decode(&raw.value)?, raw.tx)),
            Err(e) if e.is_not_found() => Err(RepositoryError::CounterUnavailable),
            Err(e) => Err(RepositoryError::backend("read", COUNTER_KEY, e)),
        }
    }

    /// Primary write of one line, without the index
    async fn write_line(&self, line: &LogLine) -> RepositoryResult<AddOutcome> {
        let key = Bytes::from(line.key().to_owned());
        let mut retries = 0;
        loop {
            let (counter, read_at) = self.read_counter().await?;
            let next = counter.advanced(1)?;

            let entries = vec![
                KeyValue::new(key.clone(), line.value().clone()),
                KeyValue::new(COUNTER_KEY, next.encode()),
            ];
            let preconditions = vec![
                Precondition::KeyMustNotExist(key.clone()),
                Precondition::key_not_modified_after(COUNTER_KEY, read_at),
            ];

            match self.store.set_all(entries, preconditions).await {
                Ok(tx) => {
                    debug!(%tx, counter = next.value(), "Created log line");
                    return Ok(AddOutcome::Created);
                }
                Err(e) if e.is_conflict() => {
                    match self.resolve_conflict(line.key(), retries).await? {
                        ConflictResolution::Retry => {
                            retries += 1;
                            debug!(retries, "Counter moved during add, retrying");
                        }
                        ConflictResolution::Overwrite => {
                            return self.overwrite(line, AddOutcome::Overwritten).await;
                        }
                        ConflictResolution::Update => {
                            return self.overwrite(line, AddOutcome::Updated).await;
                        }
                        ConflictResolution::GiveUp => {
                            warn!(retries, "Counter race retries exhausted, line not counted");
                            return self.overwrite(line, AddOutcome::CounterRaceLost).await;
                        }
                    }
                }
                Err(e) => return Err(RepositoryError::backend("add", line.key(), e)),
            }
        }
    }

    async fn resolve_conflict(
        &self,
        key: &str,
        retries: u32,
    ) -> RepositoryResult<ConflictResolution> {
        let max_retries = match self.config.conflict_policy {
            ConflictPolicy::FallbackToUpdate => return Ok(ConflictResolution::Overwrite),
            ConflictPolicy::RetryCounterRace { max_retries } => max_retries,
        };

        match self.store.get(key.as_bytes()).await {
            Ok(_) => Ok(ConflictResolution::Update),
            Err(e) if e.is_not_found() && retries < max_retries => Ok(ConflictResolution::Retry),
            Err(e) if e.is_not_found() => Ok(ConflictResolution::GiveUp),
            Err(e) => Err(RepositoryError::backend("classify conflict on", key, e)),
        }
    }

    async fn overwrite(&self, line: &LogLine, outcome: AddOutcome) -> RepositoryResult<AddOutcome> {
        let tx = self
            .store
            .set(line.key().as_bytes(), line.value().clone())
            .await
            .map_err(|e| RepositoryError::backend("update", line.key(), e))?;
        debug!(%tx, outcome = outcome.as_str(), "Wrote log line without counting it");
        Ok(outcome)
    }

    async fn commit_batch(&self, lines: &[LogLine]) -> RepositoryResult<BatchEvent> {
        let (counter, read_at) = self.read_counter().await?;
        let next = counter.advanced(self.config.batch_increment(lines.len()))?;

        let mut entries = Vec::with_capacity(lines.len() + 1);
        let mut preconditions = Vec::with_capacity(lines.len() + 1);
        for line in lines {
            let key = Bytes::from(line.key().to_owned());
            preconditions.push(Precondition::KeyMustNotExist(key.clone()));
            entries.push(KeyValue::new(key, line.value().clone()));
        }
        entries.push(KeyValue::new(COUNTER_KEY, next.encode()));
        preconditions.push(Precondition::key_not_modified_after(COUNTER_KEY, read_at));

        match self.store.set_all(entries, preconditions).await {
            Ok(tx) => {
                debug!(%tx, counter = next.value(), "Committed batch");
                Ok(BatchEvent::Committed)
            }
            Err(e) if e.is_conflict() => {
                debug!(error = %e, "Batch conflicted");
                Ok(BatchEvent::Conflict)
            }
            Err(e) => Err(RepositoryError::backend("add batch starting at", lines[0].key(), e)),
        }
    }

    async fn index_line(&self, line: &LogLine) -> RepositoryResult<()> {
        let Some(bucket) = line.bucket() else {
            return Ok(());
        };
        self.store
            .sorted_set_add(bucket, line.index_score(), line.key().as_bytes())
            .await
            .map_err(|e| RepositoryError::index_write(bucket, line.key(), e))
    }
}

fn ensure_not_reserved(line: &LogLine) -> RepositoryResult<()> {
    if is_counter_key(line.key().as_bytes()) {
        return Err(RepositoryError::ReservedKey(line.key().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchCounterMode;
    use crate::memory::InMemoryVersionedStore;
    use chrono::{TimeZone, Utc};
    use logline_core::BackendError;

    async fn repository_with(
        config: RepositoryConfig,
    ) -> (Arc<InMemoryVersionedStore>, LogLineRepository<InMemoryVersionedStore>) {
        let store = Arc::new(InMemoryVersionedStore::new());
        let repo = LogLineRepository::new(Arc::clone(&store), config);
        repo.initialize().await.unwrap();
        (store, repo)
    }

    async fn repository() -> (Arc<InMemoryVersionedStore>, LogLineRepository<InMemoryVersionedStore>) {
        repository_with(RepositoryConfig::default()).await
    }

    fn retrying(max_retries: u32) -> RepositoryConfig {
        RepositoryConfig::default()
            .with_conflict_policy(ConflictPolicy::RetryCounterRace { max_retries })
    }

    // ========================================================================
    // Initialize / Count
    // ========================================================================

    #[tokio::test]
    async fn test_initialize_creates_zero_counter() {
        let (_, repo) = repository().await;
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "fake value")).await.unwrap();

        repo.initialize().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_before_initialize() {
        let repo = LogLineRepository::new(
            Arc::new(InMemoryVersionedStore::new()),
            RepositoryConfig::default(),
        );
        let err = repo.count().await.unwrap_err();
        assert!(matches!(err, RepositoryError::CounterNotInitialized));
    }

    #[tokio::test]
    async fn test_initialize_propagates_backend_failure() {
        let store = Arc::new(InMemoryVersionedStore::new());
        store.set_unavailable(true);
        let repo = LogLineRepository::new(store, RepositoryConfig::default());

        let err = repo.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Backend {
                source: BackendError::Unavailable(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_count_rejects_malformed_counter() {
        let (store, repo) = repository().await;
        store
            .set(COUNTER_KEY.as_bytes(), Bytes::from_static(b"bad"))
            .await
            .unwrap();

        let err = repo.count().await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidCounter(_)));
    }

    // ========================================================================
    // Add
    // ========================================================================

    #[tokio::test]
    async fn test_add_without_initialize() {
        let repo = LogLineRepository::new(
            Arc::new(InMemoryVersionedStore::new()),
            RepositoryConfig::default(),
        );
        let err = repo.add(&LogLine::new("foo_0", "v")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::CounterUnavailable));
    }

    #[tokio::test]
    async fn test_add_distinct_keys_increments_counter() {
        let (_, repo) = repository().await;

        let first = repo.add(&LogLine::new("foo_0", "fake value")).await.unwrap();
        let second = repo.add(&LogLine::new("foo_1", "fake value B")).await.unwrap();

        assert_eq!(first, AddOutcome::Created);
        assert_eq!(second, AddOutcome::Created);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_same_key_updates_without_counting() {
        let (_, repo) = repository().await;

        repo.add(&LogLine::new("foo_0", "v1")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);

        let outcome = repo.add(&LogLine::new("foo_0", "v2")).await.unwrap();
        assert_eq!(outcome, AddOutcome::Overwritten);
        assert!(!outcome.counted());
        assert_eq!(repo.count().await.unwrap(), 1);

        let line = repo.get_by_key("foo_0").await.unwrap();
        assert_eq!(line.value().as_ref(), b"v2");

        let history = repo.history("foo_0").await.unwrap();
        let values: Vec<_> = history.revisions.iter().map(|r| r.value.as_ref()).collect();
        assert_eq!(values, vec![&b"v1"[..], b"v2"]);
    }

    #[tokio::test]
    async fn test_add_rejects_reserved_key() {
        let (_, repo) = repository().await;
        let err = repo.add(&LogLine::new(COUNTER_KEY, "oops")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ReservedKey(_)));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_propagates_backend_failure() {
        let (store, repo) = repository().await;
        store.set_unavailable(true);

        let err = repo.add(&LogLine::new("foo_0", "v")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_default_policy_undercounts_on_counter_race() {
        let (store, repo) = repository().await;
        store.force_conflicts(1);

        let outcome = repo.add(&LogLine::new("foo_0", "v")).await.unwrap();
        assert_eq!(outcome, AddOutcome::Overwritten);
        assert_eq!(repo.count().await.unwrap(), 0);
        assert_eq!(repo.get_by_key("foo_0").await.unwrap().value().as_ref(), b"v");
    }

    #[tokio::test]
    async fn test_retry_policy_recounts_after_counter_race() {
        let (store, repo) = repository_with(retrying(3)).await;
        store.force_conflicts(2);

        let outcome = repo.add(&LogLine::new("foo_0", "v")).await.unwrap();
        assert_eq!(outcome, AddOutcome::Created);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_policy_classifies_existing_key_as_update() {
        let (_, repo) = repository_with(retrying(3)).await;

        repo.add(&LogLine::new("foo_0", "v1")).await.unwrap();
        let outcome = repo.add(&LogLine::new("foo_0", "v2")).await.unwrap();

        assert_eq!(outcome, AddOutcome::Updated);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_policy_gives_up_after_budget() {
        let (store, repo) = repository_with(retrying(2)).await;
        store.force_conflicts(10);

        let outcome = repo.add(&LogLine::new("foo_0", "v")).await.unwrap();
        assert_eq!(outcome, AddOutcome::CounterRaceLost);
        assert_eq!(repo.count().await.unwrap(), 0);
        assert_eq!(repo.get_by_key("foo_0").await.unwrap().value().as_ref(), b"v");
    }

    // ========================================================================
    // Bucket index
    // ========================================================================

    #[tokio::test]
    async fn test_bucket_returns_lines_oldest_first() {
        let (_, repo) = repository().await;
        let early = Utc.timestamp_opt(100, 0).unwrap();
        let late = Utc.timestamp_opt(200, 0).unwrap();

        // Written newest first; the index orders by timestamp, not write order
        repo.add(&LogLine::with_bucket("b", "svc_200", "late", late)).await.unwrap();
        repo.add(&LogLine::with_bucket("b", "svc_100", "early", early)).await.unwrap();
        repo.add(&LogLine::with_bucket("other", "svc_150", "x", early)).await.unwrap();

        let lines = repo.get_by_bucket("b").await.unwrap();
        let keys: Vec<_> = lines.iter().map(|l| l.key()).collect();
        assert_eq!(keys, vec!["svc_100", "svc_200"]);
        assert_eq!(lines[0].bucket(), Some("b"));
        assert_eq!(lines[0].time(), Some(early));
        assert_eq!(lines[1].value().as_ref(), b"late");
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_empty() {
        let (_, repo) = repository().await;
        assert!(repo.get_by_bucket("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bucket_member_missing_from_storage_is_an_error() {
        let (store, repo) = repository().await;
        store.sorted_set_add("b", 1, b"ghost_1").await.unwrap();

        let err = repo.get_by_bucket("b").await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::MissingIndexedLine { ref key, .. } if key == "ghost_1"
        ));
    }

    #[tokio::test]
    async fn test_index_failure_surfaces_after_primary_write() {
        let (store, repo) = repository().await;
        store.set_fail_index_writes(true);

        let line = LogLine::with_bucket("b", "svc_1", "v", Utc::now());
        let err = repo.add(&line).await.unwrap_err();
        assert!(matches!(err, RepositoryError::IndexWrite { .. }));

        // Primary data is durable, the index is not
        assert_eq!(repo.get_by_key("svc_1").await.unwrap().value().as_ref(), b"v");
        assert_eq!(repo.count().await.unwrap(), 1);
        store.set_fail_index_writes(false);
        assert!(repo.get_by_bucket("b").await.unwrap().is_empty());
    }

    // ========================================================================
    // Reads
    // ========================================================================

    #[tokio::test]
    async fn test_history_lists_every_revision_in_order() {
        let (_, repo) = repository().await;
        let key = "foo_9";
        for value in ["fake value", "fake value X", "fake value XX", "fake value XXX"] {
            repo.add(&LogLine::new(key, value)).await.unwrap();
        }

        let history = repo.history(key).await.unwrap();
        assert_eq!(history.key, key);
        assert_eq!(history.revisions.len(), 4);
        for (i, revision) in history.revisions.iter().enumerate() {
            assert_eq!(revision.revision, i as u64 + 1);
        }
        assert!(history.revisions.windows(2).all(|w| w[0].tx < w[1].tx));
        assert_eq!(history.revisions[3].value.as_ref(), b"fake value XXX");
    }

    #[tokio::test]
    async fn test_history_filters_counter_key() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "v")).await.unwrap();

        let history = repo.history(COUNTER_KEY).await.unwrap();
        assert!(history.revisions.is_empty());
    }

    #[tokio::test]
    async fn test_history_of_unknown_key() {
        let (_, repo) = repository().await;
        let err = repo.history("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_by_key_missing() {
        let (_, repo) = repository().await;
        let err = repo.get_by_key("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_by_prefix() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "fake value")).await.unwrap();
        repo.add(&LogLine::new("foo_1", "fake value b")).await.unwrap();
        repo.add(&LogLine::new("bar_0", "other")).await.unwrap();

        let lines = repo.get_by_prefix("foo").await.unwrap();
        let keys: Vec<_> = lines.iter().map(|l| l.key()).collect();
        assert_eq!(keys, vec!["foo_0", "foo_1"]);
    }

    #[tokio::test]
    async fn test_empty_prefix_includes_counter_key() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "v")).await.unwrap();

        let lines = repo.get_by_prefix("").await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.key() == COUNTER_KEY));
    }

    #[tokio::test]
    async fn test_last_n_returns_most_recent_lines() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "fake value")).await.unwrap();
        repo.add(&LogLine::new("foo_1", "fake value b")).await.unwrap();
        repo.add(&LogLine::new("foo_x", "fake value c")).await.unwrap();

        let lines = repo.get_last_n_log_lines(3).await.unwrap();
        let keys: Vec<_> = lines.iter().map(|l| l.key()).collect();
        assert_eq!(keys, vec!["foo_x", "foo_1", "foo_0"]);

        let lines = repo.get_last_n_log_lines(2).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].value().as_ref(), b"fake value b");
    }

    #[tokio::test]
    async fn test_last_n_counts_transactions_not_lines() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("foo_0", "v")).await.unwrap();

        // The window also covers the counter-only initialization transaction
        let lines = repo.get_last_n_log_lines(5).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(repo.get_last_n_log_lines(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_n_without_key_padding() {
        let store = Arc::new(InMemoryVersionedStore::new().without_key_padding());
        let repo = LogLineRepository::new(store, RepositoryConfig::default());
        repo.initialize().await.unwrap();
        repo.add(&LogLine::new("foo_0", "v")).await.unwrap();

        let lines = repo.get_last_n_log_lines(1).await.unwrap();
        assert_eq!(lines[0].key(), "foo_0");
    }

    // ========================================================================
    // AddBatch
    // ========================================================================

    #[tokio::test]
    async fn test_batch_of_new_lines_counts_once() {
        let (_, repo) = repository().await;
        let lines = vec![LogLine::new("bar_0", "x"), LogLine::new("bar_1", "y")];

        let report = repo.add_batch(&lines).await.unwrap();
        assert_eq!(report.path, BatchPath::Atomic);
        assert!(report.is_complete());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get_by_key("bar_1").await.unwrap().value().as_ref(), b"y");
    }

    #[tokio::test]
    async fn test_batch_one_per_line_mode() {
        let config =
            RepositoryConfig::default().with_batch_counter_mode(BatchCounterMode::OnePerLine);
        let (_, repo) = repository_with(config).await;
        let lines = vec![LogLine::new("bar_0", "x"), LogLine::new("bar_1", "y")];

        repo.add_batch(&lines).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_with_existing_key_falls_back_line_by_line() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("bar_0", "old")).await.unwrap();

        let lines = vec![LogLine::new("bar_0", "new"), LogLine::new("bar_1", "y")];
        let report = repo.add_batch(&lines).await.unwrap();

        assert_eq!(report.path, BatchPath::Fallback);
        assert_eq!(report.lines.len(), 2);
        assert!(matches!(report.lines[0].result, Ok(AddOutcome::Overwritten)));
        assert!(matches!(report.lines[1].result, Ok(AddOutcome::Created)));
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.get_by_key("bar_0").await.unwrap().value().as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_keys_falls_back() {
        let (_, repo) = repository().await;
        let lines = vec![LogLine::new("bar_0", "a"), LogLine::new("bar_0", "b")];

        let report = repo.add_batch(&lines).await.unwrap();
        assert_eq!(report.path, BatchPath::Fallback);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.history("bar_0").await.unwrap().revisions.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_indexes_bucketed_lines_once() {
        let (_, repo) = repository().await;
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        let lines = vec![
            LogLine::with_bucket("b", "svc_2", "two", t(2)),
            LogLine::new("svc_plain", "plain"),
            LogLine::with_bucket("b", "svc_1", "one", t(1)),
        ];

        repo.add_batch(&lines).await.unwrap();
        let keys: Vec<_> = repo
            .get_by_bucket("b")
            .await
            .unwrap()
            .iter()
            .map(|l| l.key().to_string())
            .collect();
        assert_eq!(keys, vec!["svc_1", "svc_2"]);
    }

    #[tokio::test]
    async fn test_batch_index_failure_keeps_indexing_later_lines() {
        let (store, repo) = repository().await;
        store.reject_index_member(Bytes::from_static(b"svc_1"));

        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        let lines = vec![
            LogLine::with_bucket("b", "svc_1", "one", t(1)),
            LogLine::with_bucket("b", "svc_2", "two", t(2)),
        ];
        let report = repo.add_batch(&lines).await.unwrap();

        assert_eq!(report.path, BatchPath::Atomic);
        assert!(report.is_complete());
        let unindexed: Vec<_> = report.index_failures().map(|l| l.key.as_str()).collect();
        assert_eq!(unindexed, vec!["svc_1"]);
        assert!(matches!(
            report.index_result(),
            Err(RepositoryError::IndexWrite { ref key, .. }) if key == "svc_1"
        ));

        let indexed: Vec<_> = repo
            .get_by_bucket("b")
            .await
            .unwrap()
            .iter()
            .map(|l| l.key().to_string())
            .collect();
        assert_eq!(indexed, vec!["svc_2"]);
        assert_eq!(repo.get_by_key("svc_1").await.unwrap().value().as_ref(), b"one");
    }

    #[tokio::test]
    async fn test_batch_fallback_indexes_lines() {
        let (_, repo) = repository().await;
        repo.add(&LogLine::new("svc_1", "old")).await.unwrap();

        let t = Utc.timestamp_opt(1, 0).unwrap();
        let lines = vec![
            LogLine::with_bucket("b", "svc_1", "one", t),
            LogLine::with_bucket("b", "svc_2", "two", t),
        ];
        let report = repo.add_batch(&lines).await.unwrap();

        assert_eq!(report.path, BatchPath::Fallback);
        assert_eq!(repo.get_by_bucket("b").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_backend_failure_skips_fallback() {
        let (store, repo) = repository().await;
        store.set_unavailable(true);

        let lines = vec![LogLine::new("bar_0", "x")];
        let err = repo.add_batch(&lines).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Backend { .. }));

        store.set_unavailable(false);
        assert!(repo.get_by_key("bar_0").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let (store, repo) = repository().await;
        let before = store.tx_count().await;

        let report = repo.add_batch(&[]).await.unwrap();
        assert_eq!(report.path, BatchPath::Empty);
        assert_eq!(store.tx_count().await, before);
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_rejects_reserved_key() {
        let (_, repo) = repository().await;
        let lines = vec![LogLine::new("bar_0", "x"), LogLine::new(COUNTER_KEY, "y")];
        let err = repo.add_batch(&lines).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ReservedKey(_)));
    }
}
