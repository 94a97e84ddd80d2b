//! # Logline Service
//!
//! Request-level operations for the logline store.
//!
//! [`LogService`] sits between a transport (the HTTP gateway in
//! `logline-server`) and the repository. It derives line keys from the
//! request's source and creation time, filters the reserved counter key out
//! of listings, assembles histories and bounds every call with a timeout.
//!
//! ## Example
//!
//! ```rust,ignore
//! use logline_service::{CreateLogLineRequest, LogService, ServiceConfig};
//!
//! let service = LogService::new(repository, ServiceConfig::default());
//! let response = service
//!     .create_log_line(&CreateLogLineRequest::new("api", "started", chrono::Utc::now()))
//!     .await?;
//! println!("stored as {}", response.key);
//! ```

pub mod config;
pub mod error;
pub mod service;
pub mod types;

pub use config::{DEFAULT_CALL_TIMEOUT_MS, ServiceConfig};
pub use error::{ServiceError, ServiceResult};
pub use service::LogService;
pub use types::*;
