//! Command-line interface

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::client::{ClientCommand, DEFAULT_SERVER_URL};
use crate::config::{ConfigError, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "logline", version, about = "Log-line store HTTP gateway and client")]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Override the listen address (e.g. "127.0.0.1:9090")
        #[arg(long)]
        http_addr: Option<SocketAddr>,

        /// Override the log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Print the effective configuration and exit
    CheckConfig,

    /// Send one request to a running gateway and print the JSON response
    Client {
        /// Gateway base URL
        #[arg(long, env = "LOGLINE_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Request timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        #[command(subcommand)]
        request: ClientCommand,
    },
}

impl Cli {
    /// Resolve the configuration: file, then environment, then flags
    pub fn resolve_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        config.apply_env()?;
        if let Command::Serve {
            http_addr,
            log_level,
        } = &self.command
        {
            config.apply_flags(*http_addr, log_level.clone());
        }
        Ok(config)
    }
}
