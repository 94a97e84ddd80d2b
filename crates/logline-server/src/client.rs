//! HTTP client for the gateway routes

use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use logline_service::{
    BatchCreateLogLinesRequest, BatchCreateLogLinesResponse, CountResponse, CreateLogLineRequest,
    CreateLogLineResponse, LogLineHistories, LogLineView, LogLines,
};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Gateway address used when none is given
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:9090";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid gateway URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unable to reach gateway: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with an error status
    #[error("Gateway returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("Unable to render response: {0}")]
    Render(#[from] serde_json::Error),
}

impl ClientError {
    /// Status code of a gateway error response
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Typed client for one gateway
#[derive(Debug, Clone)]
pub struct LogClient {
    http: Client,
    base_url: Url,
}

impl LogClient {
    /// Client for the gateway at `base_url`; every request is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub async fn create_log_line(
        &self,
        request: &CreateLogLineRequest,
    ) -> Result<CreateLogLineResponse, ClientError> {
        self.post(&["logs"], request).await
    }

    pub async fn batch_create_log_lines(
        &self,
        request: &BatchCreateLogLinesRequest,
    ) -> Result<BatchCreateLogLinesResponse, ClientError> {
        self.post(&["logs", "batch"], request).await
    }

    pub async fn get_log_line_count(&self) -> Result<CountResponse, ClientError> {
        self.get(&["logs", "count"], None).await
    }

    pub async fn get_log_line_by_key(&self, key: &str) -> Result<LogLineView, ClientError> {
        self.get(&["logs", "key", key], None).await
    }

    /// Lines whose key starts with `prefix`; an empty prefix lists every line
    pub async fn get_log_lines_by_prefix(&self, prefix: &str) -> Result<LogLines, ClientError> {
        self.get(&["logs", "prefix"], Some(("prefix", prefix))).await
    }

    pub async fn get_log_lines_by_bucket(&self, bucket: &str) -> Result<LogLines, ClientError> {
        self.get(&["logs", "bucket", bucket], None).await
    }

    pub async fn get_all_log_lines_history(&self) -> Result<LogLineHistories, ClientError> {
        self.get(&["logs", "history"], None).await
    }

    pub async fn get_last_n_log_lines_history(
        &self,
        n: usize,
    ) -> Result<LogLineHistories, ClientError> {
        let n = n.to_string();
        self.get(&["logs", "history", "last", &n], None).await
    }

    /// `/v1/{segments...}`, each segment percent-encoded
    fn route(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "not a base URL".to_string(),
            })?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: Option<(&str, &str)>,
    ) -> Result<T, ClientError> {
        let url = self.route(segments)?;
        debug!(%url, "GET");
        let mut request = self.http.get(url);
        if let Some(pair) = query {
            request = request.query(&[pair]);
        }
        decode(request.send().await?).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.route(segments)?;
        debug!(%url, "POST");
        decode(self.http.post(url).json(body).send().await?).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let message = match response.json::<serde_json::Value>().await {
        Ok(body) => match body.get("error").and_then(|e| e.as_str()) {
            Some(error) => error.to_string(),
            None => body.to_string(),
        },
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(ClientError::Api { status, message })
}

/// Requests the `client` subcommand can send
#[derive(Debug, Clone, Subcommand)]
pub enum ClientCommand {
    /// Add a single log line
    Add {
        #[arg(long)]
        source: String,

        #[arg(long)]
        value: String,

        /// Index the line under this bucket
        #[arg(long)]
        bucket: Option<String>,

        /// RFC 3339 creation time, now when omitted
        #[arg(long)]
        created_at: Option<DateTime<Utc>>,
    },

    /// Add a batch of lines given as JSON: `{"lines": [...]}` or a bare array
    Batch {
        #[arg(long, value_parser = parse_batch)]
        lines: BatchCreateLogLinesRequest,
    },

    /// Count stored log lines
    Count,

    /// Get a log line by key
    GetByKey { key: String },

    /// List log lines whose key starts with a prefix
    GetByPrefix {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// List log lines of a bucket, ordered by creation time
    GetByBucket { bucket: String },

    /// History of every stored key
    HistoryAll,

    /// History of keys written by the last N transactions
    HistoryN {
        #[arg(short, long, default_value_t = 3)]
        number: usize,
    },
}

impl ClientCommand {
    /// Send the request and return the response as JSON
    pub async fn run(&self, client: &LogClient) -> Result<serde_json::Value, ClientError> {
        let value = match self {
            Self::Add {
                source,
                value,
                bucket,
                created_at,
            } => {
                let mut request =
                    CreateLogLineRequest::new(source, value, created_at.unwrap_or_else(Utc::now));
                request.bucket = bucket.clone();
                serde_json::to_value(client.create_log_line(&request).await?)?
            }
            Self::Batch { lines } => {
                serde_json::to_value(client.batch_create_log_lines(lines).await?)?
            }
            Self::Count => serde_json::to_value(client.get_log_line_count().await?)?,
            Self::GetByKey { key } => {
                serde_json::to_value(client.get_log_line_by_key(key).await?)?
            }
            Self::GetByPrefix { prefix } => {
                serde_json::to_value(client.get_log_lines_by_prefix(prefix).await?)?
            }
            Self::GetByBucket { bucket } => {
                serde_json::to_value(client.get_log_lines_by_bucket(bucket).await?)?
            }
            Self::HistoryAll => serde_json::to_value(client.get_all_log_lines_history().await?)?,
            Self::HistoryN { number } => {
                serde_json::to_value(client.get_last_n_log_lines_history(*number).await?)?
            }
        };
        Ok(value)
    }
}

fn parse_batch(raw: &str) -> Result<BatchCreateLogLinesRequest, String> {
    if let Ok(lines) = serde_json::from_str::<Vec<CreateLogLineRequest>>(raw) {
        return Ok(BatchCreateLogLinesRequest { lines });
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid batch JSON: {e}"))
}
