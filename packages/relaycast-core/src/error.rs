//! Centralized error types for the Relaycast core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Playback failures are not errors in this sense: they are classified into
//! [`ErrorKind`](crate::playback::ErrorKind) and travel inside events.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from the match/channel directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The requested match does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The directory answered with a 5xx status or `success: false`.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The directory could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The response body did not match the expected envelope.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl DirectoryError {
    /// Transient errors are retried with backoff; the rest surface at once.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Network(_))
    }
}

impl ErrorCode for DirectoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_error",
            Self::Network(_) => "network_error",
            Self::Decode(_) => "invalid_response",
        }
    }
}

/// Result alias for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

// ─────────────────────────────────────────────────────────────────────────────
// Session Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from opening or commanding channel sessions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A session needs at least one channel.
    #[error("Match has no channels")]
    NoChannels,

    #[error("Channel index {index} out of range (channel count {count})")]
    ChannelOutOfRange { index: usize, count: usize },

    #[error("Session not found: {0}")]
    NotFound(String),

    /// Too many sessions are open.
    #[error("Session limit reached ({0})")]
    LimitReached(usize),

    /// The session task has shut down.
    #[error("Session closed")]
    Closed,
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoChannels => "no_channels",
            Self::ChannelOutOfRange { .. } => "channel_out_of_range",
            Self::NotFound(_) => "session_not_found",
            Self::LimitReached(_) => "session_limit_reached",
            Self::Closed => "session_closed",
        }
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// ─────────────────────────────────────────────────────────────────────────────
// Application Error
// ─────────────────────────────────────────────────────────────────────────────

/// Application-wide error type for the Relaycast server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum RelaycastError {
    /// Match, channel list or session does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The directory failed after its retry budget.
    #[error("Directory error: {0}")]
    Directory(String),

    /// No room for another session.
    #[error("Session limit reached: {0}")]
    SessionLimit(String),

    /// The session shut down while handling the request.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Server configuration error (invalid or missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelaycastError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Directory(_) => "directory_error",
            Self::SessionLimit(_) => "session_limit_reached",
            Self::SessionClosed(_) => "session_closed",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Directory(_) => StatusCode::BAD_GATEWAY,
            Self::SessionLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::SessionClosed(_) => StatusCode::GONE,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type RelaycastResult<T> = Result<T, RelaycastError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for RelaycastError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DirectoryError> for RelaycastError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(what) => Self::NotFound(what),
            other => Self::Directory(other.to_string()),
        }
    }
}

impl From<SessionError> for RelaycastError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::NotFound(format!("session {}", id)),
            SessionError::NoChannels | SessionError::ChannelOutOfRange { .. } => {
                Self::InvalidRequest(err.to_string())
            }
            SessionError::LimitReached(_) => Self::SessionLimit(err.to_string()),
            SessionError::Closed => Self::SessionClosed(err.to_string()),
        }
    }
}
