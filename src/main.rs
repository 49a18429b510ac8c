//! Frontend service.
//!
//! Serves a small HTTP API in front of a backend service and reports a
//! correlated trace, log stream and metric set for every request.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────┐
//!                        │                FRONTEND SERVICE               │
//!   Client Request       │  ┌──────────┐   ┌──────────┐   ┌──────────┐   │
//!   ─────────────────────┼─▶│ pipeline │──▶│ handlers │──▶│ backend  │───┼──▶ Backend
//!                        │  │ (begin)  │   │          │   │  client  │   │    Service
//!   Client Response      │  ├──────────┤   └──────────┘   └──────────┘   │
//!   ◀────────────────────┼──│(finalize)│◀──── response / AppError         │
//!                        │  └──────────┘                                 │
//!                        │  ┌─────────────────────────────────────────┐  │
//!                        │  │            observability                │  │
//!                        │  │  spans → OTLP    logs → stdout   /metrics│  │
//!                        │  └─────────────────────────────────────────┘  │
//!                        └───────────────────────────────────────────────┘
//! ```

use clap::Parser;
use frontend_service::config::load_config;
use frontend_service::lifecycle::{wait_for_signal, Shutdown};
use frontend_service::observability::logging::init_logging;
use frontend_service::observability::LogFields;
use frontend_service::{HttpServer, Telemetry};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "frontend-service")]
#[command(about = "Instrumented frontend in front of a backend service", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config.logging)?;

    let telemetry = Telemetry::start(&config.tracing)?;
    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;

    telemetry.logger.info(
        &format!("Frontend service started on {}", local_addr),
        None,
        LogFields {
            address: Some(local_addr.to_string()),
            backend_url: Some(config.backend.url.clone()),
            trace_agent: Some(config.tracing.endpoint()),
            ..Default::default()
        },
    );

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        tracing::info!(signal, "Termination signal received");
        trigger.trigger();
    });

    let server = HttpServer::new(&config, telemetry.clone())?;
    server.run(listener, server_shutdown).await?;

    if !telemetry.shutdown(config.tracing.shutdown_flush()).await {
        tracing::warn!("Trace flush did not finish before the deadline");
    }

    telemetry.logger.info("Shutdown complete", None, LogFields::default());
    Ok(())
}
