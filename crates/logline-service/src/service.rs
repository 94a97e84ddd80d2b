//! Log service
//!
//! Request-level operations over a [`LogLineRepository`]. Each call is
//! bounded by the configured timeout, repository round trips included.

use std::future::Future;

use logline_core::{COUNTER_KEY, LogLine, VersionedKvStore};
use logline_storage::{LogLineRepository, RepositoryResult};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{
    BatchCreateLogLinesRequest, BatchCreateLogLinesResponse, CountResponse, CreateLogLineRequest,
    CreateLogLineResponse, HistoryView, LogLineHistories, LogLineView, LogLines,
};

/// Log-line operations for request handlers
pub struct LogService<S> {
    repository: LogLineRepository<S>,
    config: ServiceConfig,
}

impl<S> Clone for LogService<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: VersionedKvStore> LogService<S> {
    pub fn new(repository: LogLineRepository<S>, config: ServiceConfig) -> Self {
        Self { repository, config }
    }

    pub fn repository(&self) -> &LogLineRepository<S> {
        &self.repository
    }

    /// Store one line and return its derived key
    #[instrument(skip(self, request), fields(source = %request.source))]
    pub async fn create_log_line(
        &self,
        request: &CreateLogLineRequest,
    ) -> ServiceResult<CreateLogLineResponse> {
        let line = request.to_log_line()?;
        let outcome = self
            .bounded("create log line", self.repository.add(&line))
            .await?;
        info!(key = line.key(), outcome = outcome.as_str(), "Created log line");
        Ok(CreateLogLineResponse {
            key: line.key().to_string(),
        })
    }

    /// Store a batch of lines and return their derived keys in request order
    ///
    /// Lines that failed during a line-by-line fallback, and stored lines
    /// that missed their bucket index, are listed in the response instead
    /// of failing the whole call.
    #[instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn batch_create_log_lines(
        &self,
        request: &BatchCreateLogLinesRequest,
    ) -> ServiceResult<BatchCreateLogLinesResponse> {
        let lines = request
            .lines
            .iter()
            .map(CreateLogLineRequest::to_log_line)
            .collect::<ServiceResult<Vec<_>>>()?;
        let keys: Vec<String> = lines.iter().map(|line| line.key().to_string()).collect();

        let report = self
            .bounded("create log line batch", self.repository.add_batch(&lines))
            .await?;
        if let Err(e) = report.index_result() {
            warn!(error = %e, "Log line batch stored with missing index entries");
        }
        info!(path = report.path.as_str(), "Created log line batch");
        Ok(BatchCreateLogLinesResponse::from_report(keys, &report))
    }

    /// History of every stored line
    pub async fn get_all_log_lines_history(&self) -> ServiceResult<LogLineHistories> {
        let histories = async {
            let lines = self.repository.get_by_prefix("").await?;
            self.histories(lines).await
        };
        self.bounded("read all histories", histories).await
    }

    /// History of the lines touched by the last `n` transactions
    pub async fn get_last_n_log_lines_history(&self, n: usize) -> ServiceResult<LogLineHistories> {
        let histories = async {
            let lines = self.repository.get_last_n_log_lines(n).await?;
            self.histories(lines).await
        };
        self.bounded("read recent histories", histories).await
    }

    pub async fn get_log_line_count(&self) -> ServiceResult<CountResponse> {
        let total = self
            .bounded("count log lines", self.repository.count())
            .await?;
        Ok(CountResponse { total })
    }

    pub async fn get_log_line_by_key(&self, key: &str) -> ServiceResult<LogLineView> {
        let line = self
            .bounded("get log line", self.repository.get_by_key(key))
            .await?;
        Ok(LogLineView::from(&line))
    }

    /// Lines whose key starts with `prefix`, counter excluded
    pub async fn get_log_lines_by_prefix(&self, prefix: &str) -> ServiceResult<LogLines> {
        let lines = self
            .bounded("scan log lines", self.repository.get_by_prefix(prefix))
            .await?;
        Ok(without_counter(lines).into())
    }

    pub async fn get_log_lines_by_bucket(&self, bucket: &str) -> ServiceResult<LogLines> {
        let lines = self
            .bounded("read bucket", self.repository.get_by_bucket(bucket))
            .await?;
        Ok(lines.into())
    }

    async fn histories(&self, lines: Vec<LogLine>) -> RepositoryResult<LogLineHistories> {
        let mut histories = Vec::with_capacity(lines.len());
        for line in without_counter(lines) {
            let history = self.repository.history(line.key()).await?;
            histories.push(HistoryView::from(history));
        }
        debug!(lines = histories.len(), "Assembled histories");
        Ok(LogLineHistories { histories })
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> ServiceResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        let limit = self.config.call_timeout();
        match timeout(limit, call).await {
            Ok(result) => result.map_err(|e| {
                warn!(operation, error = %e, "Repository call failed");
                ServiceError::from(e)
            }),
            Err(_) => {
                warn!(operation, timeout = ?limit, "Repository call timed out");
                Err(ServiceError::Timeout {
                    operation,
                    timeout: limit,
                })
            }
        }
    }
}

fn without_counter(lines: Vec<LogLine>) -> Vec<LogLine> {
    lines
        .into_iter()
        .filter(|line| line.key() != COUNTER_KEY)
        .collect()
}
