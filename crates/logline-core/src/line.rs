//! Log line value objects

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::TxId;

/// One stored log line
///
/// Immutable once built. The key is treated as an opaque unique string;
/// the bucket and timestamp only matter for the secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    key: String,
    value: Bytes,
    bucket: Option<String>,
    time: Option<DateTime<Utc>>,
}

impl LogLine {
    /// Create a line without a bucket
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            bucket: None,
            time: None,
        }
    }

    /// Create a line indexed under `bucket`, scored by `time`
    ///
    /// An empty bucket name means "not indexed".
    pub fn with_bucket(
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Bytes>,
        time: DateTime<Utc>,
    ) -> Self {
        let bucket = bucket.into();
        Self {
            key: key.into(),
            value: value.into(),
            bucket: (!bucket.is_empty()).then_some(bucket),
            time: Some(time),
        }
    }

    /// The unique key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The payload
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Bucket name, if the line is indexed
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// Creation time, if known
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// Sort score in the bucket index
    ///
    /// Lines without a representable timestamp score 0 and sort first.
    pub fn index_score(&self) -> i64 {
        self.time
            .and_then(|t| t.timestamp_nanos_opt())
            .unwrap_or_default()
    }
}

/// Every recorded revision of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLineHistory {
    pub key: String,
    pub revisions: Vec<LogLineRevision>,
}

/// One historical value of a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLineRevision {
    pub value: Bytes,
    pub tx: TxId,
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plain_line_has_no_bucket() {
        let line = LogLine::new("foo_0", "fake value");
        assert_eq!(line.key(), "foo_0");
        assert_eq!(line.value().as_ref(), b"fake value");
        assert!(line.bucket().is_none());
        assert!(line.time().is_none());
        assert_eq!(line.index_score(), 0);
    }

    #[test]
    fn test_empty_bucket_is_not_indexed() {
        let line = LogLine::with_bucket("", "foo_0", "v", Utc::now());
        assert!(line.bucket().is_none());
    }

    #[test]
    fn test_index_score_is_nanos() {
        let time = Utc.timestamp_opt(2, 7).unwrap();
        let line = LogLine::with_bucket("b", "foo_0", "v", time);
        assert_eq!(line.bucket(), Some("b"));
        assert_eq!(line.index_score(), 2_000_000_007);
    }

    #[test]
    fn test_line_serde_roundtrip() {
        let line = LogLine::with_bucket("b", "foo_0", "v", Utc.timestamp_opt(2, 0).unwrap());
        let json = serde_json::to_string(&line).unwrap();
        let back: LogLine = serde_json::from_str(&json).unwrap();
        assert_eq!(back, line);
    }
}
