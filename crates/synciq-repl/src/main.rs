#![warn(missing_docs)]

//! `siq-repl`: drive SyncIQ policies through failover, failback and sync.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use synciq_repl::cli::Cli;
use synciq_repl::{OrchestratorConfig, ReplConfig, ReplicationClient};
use synciq_transport::HttpArray;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    let mut config = if cli.config.exists() {
        ReplConfig::from_file(&cli.config)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", cli.config.display());
        ReplConfig::default()
    };
    if let Some(endpoint) = cli.endpoint.clone() {
        config.endpoint = endpoint;
    }
    if let Some(timeout) = cli.timeout_secs {
        config.poll_timeout_secs = timeout;
    }
    config.validate()?;

    let array = HttpArray::new(config.http_config())?;
    let client = ReplicationClient::new(Arc::new(array), OrchestratorConfig::from(&config));

    let ctx = CancellationToken::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling operation");
            interrupt.cancel();
        }
    });

    tracing::debug!(endpoint = %config.endpoint, "using array");
    cli.command.run(&client, &ctx).await
}
