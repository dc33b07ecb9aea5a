//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the playback and session layers to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for playback transitions and session lifecycle

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::playback::{AttemptPhase, ErrorKind};

/// Events broadcast to clients.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Transitions of a session's playback state machine.
    Playback(PlaybackEvent),

    /// Channel session lifecycle.
    Session(SessionEvent),
}

/// Events emitted by the playback orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// The attempt state machine entered a new phase.
    ///
    /// Emitted for every transition into `Loading`, `Playing`, `Retrying`,
    /// `AdvancingCandidate`, `Failed` and `Idle`.
    PhaseChanged {
        #[serde(rename = "sessionId")]
        session_id: String,
        phase: AttemptPhase,
        /// Classified failure that caused this transition, if any.
        /// `Exhausted` for terminal failures.
        #[serde(rename = "errorKind", skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
        /// Last failure observed on the channel before this transition.
        #[serde(rename = "lastFailure", skip_serializing_if = "Option::is_none")]
        last_failure: Option<ErrorKind>,
        #[serde(rename = "retryCount")]
        retry_count: u32,
        #[serde(rename = "candidateIndex")]
        candidate_index: usize,
        #[serde(rename = "channelIndex")]
        channel_index: usize,
        /// URL being loaded, or about to be loaded after a delay.
        #[serde(rename = "candidateUrl", skip_serializing_if = "Option::is_none")]
        candidate_url: Option<String>,
        /// Delay before the scheduled reload, for `Retrying` and
        /// `AdvancingCandidate`.
        #[serde(rename = "retryInMs", skip_serializing_if = "Option::is_none")]
        retry_in_ms: Option<u64>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to channel sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A session was opened for a match.
    Opened {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "matchId")]
        match_id: String,
        #[serde(rename = "channelCount")]
        channel_count: usize,
        timestamp: u64,
    },
    /// A channel became current and its playback cycle started.
    ChannelSelected {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "channelIndex")]
        channel_index: usize,
        title: String,
        /// Source label (`relay`, `hls`, `dash`, `mp4`, `web`).
        source: &'static str,
        timestamp: u64,
    },
    /// The current channel failed terminally and the session will move on
    /// after the settle delay.
    AutoAdvanceScheduled {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "fromIndex")]
        from_index: usize,
        #[serde(rename = "toIndex")]
        to_index: usize,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        timestamp: u64,
    },
    /// The only channel failed terminally; nothing else will be tried.
    TerminalFailure {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "channelIndex")]
        channel_index: usize,
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
        #[serde(rename = "lastFailure", skip_serializing_if = "Option::is_none")]
        last_failure: Option<ErrorKind>,
        #[serde(rename = "retryCount")]
        retry_count: u32,
        #[serde(rename = "candidateIndex")]
        candidate_index: usize,
        timestamp: u64,
    },
    /// The session was closed and its engine released.
    Closed {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: u64,
    },
}

impl BroadcastEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Playback(PlaybackEvent::PhaseChanged { session_id, .. }) => session_id,
            Self::Session(event) => event.session_id(),
        }
    }
}

impl SessionEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            Self::Opened { session_id, .. }
            | Self::ChannelSelected { session_id, .. }
            | Self::AutoAdvanceScheduled { session_id, .. }
            | Self::TerminalFailure { session_id, .. }
            | Self::Closed { session_id, .. } => session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_event_serializes_with_category_and_camel_case() {
        let event = BroadcastEvent::Playback(PlaybackEvent::PhaseChanged {
            session_id: "s1".into(),
            phase: AttemptPhase::Retrying,
            error_kind: Some(ErrorKind::NetworkError),
            last_failure: Some(ErrorKind::NetworkError),
            retry_count: 1,
            candidate_index: 0,
            channel_index: 0,
            candidate_url: Some("https://a/play?id=x".into()),
            retry_in_ms: Some(2000),
            timestamp: 1,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "playback");
        assert_eq!(json["type"], "phaseChanged");
        assert_eq!(json["phase"], "retrying");
        assert_eq!(json["errorKind"], "networkError");
        assert_eq!(json["retryInMs"], 2000);
    }

    #[test]
    fn terminal_failure_omits_absent_last_failure() {
        let event = SessionEvent::TerminalFailure {
            session_id: "s1".into(),
            channel_index: 0,
            error_kind: ErrorKind::Exhausted,
            last_failure: None,
            retry_count: 0,
            candidate_index: 3,
            timestamp: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["errorKind"], "exhausted");
        assert!(json.get("lastFailure").is_none());
        assert_eq!(event.session_id(), "s1");
    }
}
