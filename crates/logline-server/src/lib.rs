//! # Logline Server
//!
//! HTTP/JSON gateway for the logline store: configuration loading, the
//! command-line interface, the axum router over [`logline_service`] and a
//! typed client for that router.

pub mod cli;
pub mod client;
pub mod config;
pub mod http;

pub use cli::{Cli, Command};
pub use client::{ClientCommand, ClientError, DEFAULT_SERVER_URL, LogClient};
pub use config::{ConfigError, ServerConfig};
pub use http::{ApiError, router, serve};
