//! Connector Dispatch & Resilience Engine
//!
//! # Architecture Overview
//!
//! ```text
//!     HTTP client ──▶ http (axum) ──▶ dispatch ──▶ auth ──▶ resilience ──▶ transport ──▶ external API
//!                          │              │                 limiter
//!                          │              │                 retry
//!                          │              │                 breaker
//!                          │              │                 timeout
//!                          │              ▼
//!                          │          webhook notifier ──▶ resilience ──▶ transport ──▶ subscriber
//!                          ▼              ▲
//!                      scheduler ─────────┘ (via dispatch)
//!                          ▲
//!                      cron timers (trigger substrate)
//!
//!     Cross-cutting: config, store, vault, observability, lifecycle
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use connector_dispatch::config::loader::load_config;
use connector_dispatch::lifecycle::signals::shutdown_on_signal;
use connector_dispatch::observability::{logging, metrics};
use connector_dispatch::{ApiServer, Engine, HubConfig, Shutdown};

#[derive(Parser)]
#[command(name = "connector-dispatch")]
#[command(about = "Outbound API dispatch, cron jobs and signed webhooks", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "HUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => HubConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "connector-dispatch starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        connectors = config.connectors.len(),
        scheduler_enabled = config.scheduler.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let engine = Arc::new(Engine::build(&config, shutdown.clone()).await?);
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    ApiServer::new(engine, &config.server).run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
