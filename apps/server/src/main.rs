//! Relaycast Server - standalone headless playback orchestrator.
//!
//! Serves the match directory, opens channel sessions on request and keeps
//! each session's channel playing through retries, relay failover and
//! channel auto-advance. Progress is streamed to WebSocket clients.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relaycast_core::api::{bind_listener, serve};
use relaycast_core::{bootstrap_services, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Relaycast Server - resilient live stream playback orchestrator.
#[derive(Parser, Debug)]
#[command(name = "relaycast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RELAYCAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "RELAYCAST_BIND_PORT")]
    port: Option<u16>,

    /// Directory API base URL (overrides config file).
    #[arg(short = 'd', long, env = "RELAYCAST_DIRECTORY_URL")]
    directory_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Relaycast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(url) = args.directory_url {
        config.set_directory_url(url);
    }

    log::info!(
        "Configuration: bind_port={}, directory={}, max_sessions={}",
        config.bind_port,
        config.directory.base_url.as_deref().unwrap_or("(fixtures)"),
        config.max_sessions
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    let (port, listener) = bind_listener(core_config.preferred_port)
        .await
        .context("Failed to bind HTTP listener")?;
    let app_state = AppState::new(&services);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, app_state, port).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP server started on port {}", port);

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Cancels the token the server's graceful shutdown waits on, then
    // closes every session.
    services.shutdown().await;

    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
