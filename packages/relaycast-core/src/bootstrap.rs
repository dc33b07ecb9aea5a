//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root: the single place where the
//! directory, session manager, event bridge and render engines are
//! instantiated and wired together.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::directory::{CachedDirectory, DirectoryApi, HttpDirectoryClient, StaticDirectory};
use crate::error::{RelaycastError, RelaycastResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::playback::{HttpProbeEngine, RenderEngine};
use crate::protocol_constants::USER_AGENT;
use crate::runtime::TokioSpawner;
use crate::session::{EngineFactory, SessionContext, SessionManager};
use crate::source::SourceResolver;
use crate::state::Config;

/// Container for all bootstrapped services.
///
/// Consumed by [`AppState`](crate::api::AppState) to build the final
/// application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Validated configuration the services were built from.
    pub config: Arc<Config>,
    /// Memoized match/channel directory.
    pub directory: Arc<CachedDirectory>,
    /// Open channel sessions.
    pub sessions: Arc<SessionManager>,
    /// Resolver shared by every session.
    pub resolver: SourceResolver,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown: cancels background work and closes every
    /// session, which disposes their render engines.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.cancel_token.cancel();

        let closed = self.sessions.close_all().await;
        log::info!("[Bootstrap] Closed {} session(s)", closed);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the HTTP client used by the directory client. Every request is
/// bounded by the directory timeout.
fn create_http_client(config: &Config) -> RelaycastResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.directory.request_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RelaycastError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Creates the HTTP client shared by the render engines.
///
/// Only connecting is bounded here. How long a load may take is the
/// playback watchdog's call, which is usually longer than the directory
/// timeout.
fn create_engine_client(config: &Config) -> RelaycastResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.directory.request_timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RelaycastError::Internal(format!("Failed to create engine client: {}", e)))
}

/// Picks the directory backend: the REST API when a base URL is configured,
/// the built-in fixture list otherwise.
fn create_directory(config: &Config, client: &Client) -> Arc<dyn DirectoryApi> {
    match config.directory.base_url.as_deref() {
        Some(base_url) if !base_url.trim().is_empty() => {
            log::info!("[Bootstrap] Using directory API at {}", base_url);
            Arc::new(HttpDirectoryClient::new(
                client.clone(),
                base_url,
                &config.directory,
            ))
        }
        _ => {
            log::info!("[Bootstrap] No directory URL configured, serving fixture matches");
            Arc::new(StaticDirectory::sample())
        }
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Config validation
/// 2. Shared infrastructure (HTTP clients, broadcast channel, cancellation token)
/// 3. Directory (HTTP or fixture) behind the TTL cache
/// 4. Session manager with an engine factory producing probe engines
///
/// # Errors
///
/// Returns [`RelaycastError::Configuration`] if the config is invalid and
/// [`RelaycastError::Internal`] if an HTTP client cannot be built.
pub fn bootstrap_services(config: &Config) -> RelaycastResult<BootstrappedServices> {
    config.validate().map_err(RelaycastError::Configuration)?;

    let spawner = TokioSpawner::current();
    let http_client = create_http_client(config)?;
    let engine_client = create_engine_client(config)?;

    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.event_channel_capacity);
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));

    let cancel_token = CancellationToken::new();

    let directory = Arc::new(CachedDirectory::new(
        create_directory(config, &http_client),
        config.cache.clone(),
    ));

    let resolver = SourceResolver::new(config.relay_endpoints.clone());

    let engine_factory: EngineFactory = {
        let client = engine_client;
        let spawner = spawner.clone();
        Arc::new(move || {
            Arc::new(HttpProbeEngine::new(client.clone(), spawner.clone())) as Arc<dyn RenderEngine>
        })
    };

    let context = SessionContext {
        resolver: resolver.clone(),
        policy: config.playback.clone(),
        settle_delay: config.session.settle_delay(),
        engine_factory,
        emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        spawner: spawner.clone(),
    };
    let sessions = Arc::new(SessionManager::new(context, config.session.max_sessions));

    log::info!(
        "[Bootstrap] Services ready ({} relay endpoint(s), max {} session(s))",
        resolver.endpoints().len(),
        config.session.max_sessions
    );

    Ok(BootstrappedServices {
        config: Arc::new(config.clone()),
        directory,
        sessions,
        resolver,
        broadcast_tx,
        spawner,
        cancel_token,
    })
}
