//! `logline` gateway binary

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use logline_server::{Cli, Command, LogClient, ServerConfig, router, serve};
use logline_service::LogService;
use logline_storage::{InMemoryVersionedStore, LogLineRepository};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Client {
            server,
            timeout_ms,
            request,
        } => {
            let client = LogClient::new(server, Duration::from_millis(*timeout_ms))
                .context("Failed to build client")?;
            let response = request.run(&client).await.context("Request failed")?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Serve { .. } => {
            let config = cli
                .resolve_config()
                .context("Failed to load configuration")?;
            let _guard = logline_logging::init(config.logging.clone())
                .context("Failed to initialize logging")?;
            run(config).await
        }
        Command::CheckConfig => {
            let config = cli
                .resolve_config()
                .context("Failed to load configuration")?;
            print!("{}", config.to_toml().context("Failed to render configuration")?);
            Ok(())
        }
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    let store = Arc::new(InMemoryVersionedStore::new());
    let repository = LogLineRepository::new(store, config.repository.clone());
    repository
        .initialize()
        .await
        .context("Failed to initialize log line counter")?;
    info!(
        conflict_policy = %config.repository.conflict_policy,
        call_timeout_ms = config.service.call_timeout_ms,
        "Repository ready"
    );

    let service = LogService::new(repository, config.service.clone());
    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;

    serve(listener, router(service), shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Unable to listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
