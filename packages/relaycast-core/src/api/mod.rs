//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the directory and the
//! session manager. It provides the router construction, port binding and
//! the serve loop.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::directory::CachedDirectory;
use crate::events::BroadcastEvent;
use crate::session::SessionManager;
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;

/// First port tried when no preferred port is configured.
const PORT_RANGE_START: u16 = 49500;
/// Last port tried when no preferred port is configured.
const PORT_RANGE_END: u16 = 49510;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// A thin wrapper holding references to services; all business logic lives
/// in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Memoized match/channel directory.
    pub directory: Arc<CachedDirectory>,
    /// Open channel sessions.
    pub sessions: Arc<SessionManager>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Application configuration.
    pub config: Arc<Config>,
    /// Cancelled on shutdown; stops the server and open WebSocket streams.
    pub cancel_token: CancellationToken,
}

impl AppState {
    /// Builds the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices) -> Self {
        Self {
            directory: Arc::clone(&services.directory),
            sessions: Arc::clone(&services.sessions),
            broadcast_tx: services.broadcast_tx.clone(),
            config: Arc::clone(&services.config),
            cancel_token: services.cancel_token.clone(),
        }
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port, or the first free port in the default range.
pub async fn bind_listener(
    preferred_port: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, tokio::net::TcpListener::bind(&addr).await?))
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await
    }
}

/// Serves the API on an already bound listener.
///
/// Returns once the state's cancellation token fires and in-flight
/// requests have drained.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    port: u16,
) -> Result<(), ServerError> {
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);
    let shutdown = state.cancel_token.clone();
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("[Server] Stopped");
    Ok(())
}
