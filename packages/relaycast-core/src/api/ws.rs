//! WebSocket handler streaming playback and session events.
//!
//! Clients connect to `/ws` (optionally `/ws?session=<id>` to follow a
//! single session), receive an `INITIAL_STATE` message with the current
//! session snapshots, then every broadcast event as JSON text.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::events::BroadcastEvent;
use crate::session::SessionSnapshot;

/// Query parameters accepted on upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Only forward events of this session.
    #[serde(default)]
    session: Option<String>,
}

/// Control messages sent by the server besides forwarded events.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    InitialState { sessions: Vec<SessionSnapshot> },
    /// The client fell behind and `skipped` events were dropped.
    Lagged { skipped: u64 },
}

impl WsOutgoing {
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|json| Message::Text(json.into()))
    }
}

/// Whether `event` passes the connection's session filter.
fn should_forward(event: &BroadcastEvent, filter: Option<&str>) -> bool {
    filter.map_or(true, |id| event.session_id() == id)
}

fn build_initial_state(state: &AppState, filter: Option<&str>) -> Option<Message> {
    let sessions = state
        .sessions
        .snapshots()
        .into_iter()
        .filter(|snapshot| filter.map_or(true, |id| snapshot.session_id == id))
        .collect();
    WsOutgoing::InitialState { sessions }.to_message()
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, params.session))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState, filter: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let cancel_token = state.cancel_token.clone();

    log::info!(
        "[WS] New connection established (filter: {})",
        filter.as_deref().unwrap_or("all")
    );

    if let Some(msg) = build_initial_state(&state, filter.as_deref()) {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send initial state, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !should_forward(&event, filter.as_deref()) {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[WS] Client lagged, skipped {} event(s)", skipped);
                        if let Some(msg) = (WsOutgoing::Lagged { skipped }).to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    log::info!("[WS] Connection closed");
}
