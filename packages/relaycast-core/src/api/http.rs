//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the directory and the session
//! manager for business logic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_error, api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::directory::DirectoryApi;
use crate::error::{RelaycastError, RelaycastResult};
use crate::protocol_constants::SERVICE_ID;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /api/sessions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionRequest {
    match_id: u64,
    /// Channel to start on; the first channel when omitted.
    #[serde(default)]
    channel_index: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/matches", get(list_matches))
        .route("/api/matches/{id}", get(get_match))
        .route("/api/matches/{id}/channels", get(list_channels))
        .route("/api/matches/{id}/refresh", post(refresh_channels))
        .route("/api/refresh", post(handle_refresh))
        .route("/api/sessions", get(list_sessions).post(open_session))
        .route("/api/sessions/{id}", get(get_session).delete(close_session))
        .route("/api/sessions/{id}/next", post(next_channel))
        .route("/api/sessions/{id}/previous", post(previous_channel))
        .route("/api/sessions/{id}/select/{index}", post(select_channel))
        .route("/api/sessions/{id}/stop", post(stop_session))
        .route("/ws", get(ws_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: always 200 while the process is serving requests.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len(),
        "limits": {
            "maxSessions": state.config.session.max_sessions
        }
    }))
}

async fn not_found() -> impl IntoResponse {
    api_error(StatusCode::NOT_FOUND, "not_found", "No such route")
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_matches(State(state): State<AppState>) -> RelaycastResult<impl IntoResponse> {
    let matches = state.directory.list_matches().await?;
    Ok(api_success(matches))
}

async fn get_match(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let found = state.directory.get_match(id).await?;
    Ok(api_success(found))
}

async fn list_channels(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let channels = state.directory.get_channels(id).await?;
    Ok(api_success(channels))
}

/// Refetches one match's channel list, bypassing its cached copy.
async fn refresh_channels(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    state.directory.invalidate_channels(id);
    let channels = state.directory.get_channels(id).await?;
    Ok(api_success(channels))
}

/// Drops every memoized directory lookup.
async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.directory.refresh();
    api_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Opens a session for a match and starts playing its first (or requested)
/// channel. Responds with the initial snapshot.
async fn open_session(
    State(state): State<AppState>,
    Json(payload): Json<OpenSessionRequest>,
) -> RelaycastResult<impl IntoResponse> {
    let channels = state.directory.get_channels(payload.match_id).await?;
    let handle = state.sessions.open(
        &payload.match_id.to_string(),
        channels,
        payload.channel_index.unwrap_or(0),
    )?;
    Ok((StatusCode::CREATED, api_success(handle.snapshot())))
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.sessions.snapshots())
}

async fn get_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let handle = state.sessions.get(&id)?;
    Ok(api_success(handle.snapshot()))
}

async fn close_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    state.sessions.close(&id).await?;
    Ok(api_ok())
}

async fn next_channel(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let handle = state.sessions.get(&id)?;
    handle.next().await?;
    Ok(api_success(handle.snapshot()))
}

async fn previous_channel(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let handle = state.sessions.get(&id)?;
    handle.previous().await?;
    Ok(api_success(handle.snapshot()))
}

async fn select_channel(
    Path((id, index)): Path<(String, usize)>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let handle = state.sessions.get(&id)?;
    if !handle.select(index).await? {
        let count = handle.snapshot().channel_count;
        return Err(RelaycastError::InvalidRequest(format!(
            "channel index {} out of range (channel count {})",
            index, count
        )));
    }
    Ok(api_success(handle.snapshot()))
}

async fn stop_session(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> RelaycastResult<impl IntoResponse> {
    let handle = state.sessions.get(&id)?;
    handle.stop().await?;
    Ok(api_success(handle.snapshot()))
}
