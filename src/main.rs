//! # tabtrace
//!
//! Server binary: loads settings, installs logging, opens the durable
//! mirror and serves the observation service over WebSocket.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use tabtrace_engine::{ObservationService, ServiceConfig, StoreMirror};
use tabtrace_server::{ClientRegistry, HostChannel, ServerConfig};
use tabtrace_settings::TabtraceSettings;
use tabtrace_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// Tab-scoped network observation server.
#[derive(Parser, Debug)]
#[command(name = "tabtrace", about = "Tab-scoped network observation server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (defaults to `~/.tabtrace/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Keep everything in memory; nothing is written to disk.
    #[arg(long)]
    no_persist: bool,
}

fn telemetry_config(settings: &TabtraceSettings) -> TelemetryConfig {
    let logging = &settings.logging;
    TelemetryConfig {
        log_level: parse_level(&logging.level).unwrap_or(tracing::Level::INFO),
        module_levels: logging
            .modules
            .iter()
            .filter_map(|(module, level)| Some((module.clone(), parse_level(level)?)))
            .collect(),
        json: logging.json,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => tabtrace_settings::load_settings_from_path(path),
        None => tabtrace_settings::load_settings(),
    }
    .context("Failed to load settings")?;

    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    init_telemetry(&telemetry_config(&settings)).context("Failed to initialize logging")?;
    tracing::info!("Starting tabtrace server");

    let mirror = if cli.no_persist {
        tracing::warn!("persistence disabled, running in memory only");
        StoreMirror::disabled()
    } else {
        let db_path = cli
            .db_path
            .unwrap_or_else(|| tabtrace_settings::resolve_db_path(&settings));
        tracing::info!(path = %db_path.display(), "Opening durable mirror");
        StoreMirror::open(db_path)
    };

    let clients = Arc::new(ClientRegistry::new(settings.server.max_send_queue));
    let host = Arc::new(HostChannel::new(Arc::clone(&clients)));
    let service = Arc::new(ObservationService::new(
        ServiceConfig::from_settings(&settings),
        host.clone(),
        host,
        mirror,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = service.reaper().spawn_sweeper(
        Duration::from_secs(settings.storage.sweep_interval_secs),
        shutdown.clone(),
    );

    let handle = tabtrace_server::start(
        ServerConfig::from_settings(&settings.server),
        Arc::clone(&service),
        clients,
    )
    .await
    .context("Failed to start server")?;

    tracing::info!(port = handle.port, "tabtrace server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    shutdown.cancel();
    handle.abort();
    let _ = sweeper.await;
    service.shutdown().await;
    Ok(())
}
