//! Request and response types
//!
//! Payloads cross the wire as UTF-8 text; values read back from storage are
//! decoded lossily.

use chrono::{DateTime, Utc};
use logline_core::{LogLine, LogLineHistory, LogLineRevision, derive_line_key};
use logline_storage::BatchReport;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Request to create one log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLogLineRequest {
    /// Producer name, the first half of the derived key
    pub source: String,
    pub value: String,
    /// Secondary index bucket; absent or empty means "not indexed"
    #[serde(default)]
    pub bucket: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreateLogLineRequest {
    pub fn new(
        source: impl Into<String>,
        value: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            value: value.into(),
            bucket: None,
            created_at,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Build the log line, deriving its key as `{source}_{created_at nanos}`
    pub fn to_log_line(&self) -> ServiceResult<LogLine> {
        if self.source.is_empty() {
            return Err(ServiceError::invalid_request("source must not be empty"));
        }
        let key = derive_line_key(&self.source, self.created_at).ok_or_else(|| {
            ServiceError::invalid_request(format!(
                "created_at {} is outside the representable range",
                self.created_at
            ))
        })?;
        let value = self.value.clone().into_bytes();

        Ok(match self.bucket.as_deref() {
            Some(bucket) => LogLine::with_bucket(bucket, key, value, self.created_at),
            None => LogLine::new(key, value),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLogLineResponse {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreateLogLinesRequest {
    pub lines: Vec<CreateLogLineRequest>,
}

/// A batch line that was not persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreateLogLinesResponse {
    /// Derived keys, in request order
    pub keys: Vec<String>,
    /// `atomic`, `fallback` or `empty`
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<LineFailure>,
    /// Stored lines whose bucket index write failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unindexed: Vec<LineFailure>,
}

impl BatchCreateLogLinesResponse {
    pub(crate) fn from_report(keys: Vec<String>, report: &BatchReport) -> Self {
        Self {
            keys,
            path: report.path.as_str().to_string(),
            failures: report
                .failures()
                .filter_map(|line| {
                    line.result.as_ref().err().map(|e| LineFailure {
                        key: line.key.clone(),
                        error: e.to_string(),
                    })
                })
                .collect(),
            unindexed: report
                .index_failures()
                .filter_map(|line| {
                    line.index_error.as_ref().map(|e| LineFailure {
                        key: line.key.clone(),
                        error: e.to_string(),
                    })
                })
                .collect(),
        }
    }
}

/// A log line as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLineView {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl From<&LogLine> for LogLineView {
    fn from(line: &LogLine) -> Self {
        Self {
            key: line.key().to_string(),
            value: String::from_utf8_lossy(line.value()).into_owned(),
            bucket: line.bucket().map(str::to_string),
            time: line.time(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLines {
    pub log_lines: Vec<LogLineView>,
}

impl From<Vec<LogLine>> for LogLines {
    fn from(lines: Vec<LogLine>) -> Self {
        Self {
            log_lines: lines.iter().map(LogLineView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionView {
    pub tx: u64,
    pub value: String,
    pub revision: u64,
}

impl From<&LogLineRevision> for RevisionView {
    fn from(revision: &LogLineRevision) -> Self {
        Self {
            tx: revision.tx.as_u64(),
            value: String::from_utf8_lossy(&revision.value).into_owned(),
            revision: revision.revision,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    pub key: String,
    pub revisions: Vec<RevisionView>,
}

impl From<LogLineHistory> for HistoryView {
    fn from(history: LogLineHistory) -> Self {
        Self {
            revisions: history.revisions.iter().map(RevisionView::from).collect(),
            key: history.key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLineHistories {
    pub histories: Vec<HistoryView>,
}
