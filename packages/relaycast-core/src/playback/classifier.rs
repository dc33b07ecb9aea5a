//! Failure classification.
//!
//! Maps raw failure signals from the render engine (or from the state
//! machine's own watchdog and budget accounting) into a closed taxonomy that
//! decides whether a candidate is retried, skipped or abandoned.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    ENGINE_ERR_ABORTED, ENGINE_ERR_DECODE, ENGINE_ERR_NETWORK, ENGINE_ERR_SRC_NOT_SUPPORTED,
};

/// Classified playback failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Aborted,
    NetworkError,
    DecodeError,
    UnsupportedSource,
    Timeout,
    /// No candidates or retries left for the current channel. Terminal.
    Exhausted,
}

impl ErrorKind {
    /// Transient kinds: retried on the same candidate while budget remains.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkError | Self::Timeout | Self::Aborted)
    }

    /// Structural kinds: skip straight to the next candidate without
    /// spending retry budget.
    pub fn advances_candidate(self) -> bool {
        matches!(self, Self::DecodeError | Self::UnsupportedSource)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Exhausted
    }

    /// Human-readable description for user-facing messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Aborted => "Loading was aborted",
            Self::NetworkError => "Network error while loading the stream",
            Self::DecodeError => "The stream could not be decoded",
            Self::UnsupportedSource => "Stream format not supported",
            Self::Timeout => "The stream took too long to start",
            Self::Exhausted => "No working source found for this channel",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Raw failure signal fed to [`classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureSignal {
    /// Numeric media error code reported by the render engine.
    EngineCode(u16),
    /// Navigation or load failure without a media error code.
    LoadError(String),
    /// The watchdog fired before the engine reported `ready`.
    WatchdogExpired,
    /// The state machine ran out of candidates and retries.
    BudgetExhausted,
}

/// Classifies a failure signal.
///
/// Engine codes outside the known range and code-less load failures are
/// treated as network errors, so they get the retry budget rather than being
/// skipped outright.
pub fn classify(signal: &FailureSignal) -> ErrorKind {
    match signal {
        FailureSignal::EngineCode(ENGINE_ERR_ABORTED) => ErrorKind::Aborted,
        FailureSignal::EngineCode(ENGINE_ERR_NETWORK) => ErrorKind::NetworkError,
        FailureSignal::EngineCode(ENGINE_ERR_DECODE) => ErrorKind::DecodeError,
        FailureSignal::EngineCode(ENGINE_ERR_SRC_NOT_SUPPORTED) => ErrorKind::UnsupportedSource,
        FailureSignal::EngineCode(code) => {
            log::debug!("[Classifier] Unknown engine code {}, treating as network", code);
            ErrorKind::NetworkError
        }
        FailureSignal::LoadError(_) => ErrorKind::NetworkError,
        FailureSignal::WatchdogExpired => ErrorKind::Timeout,
        FailureSignal::BudgetExhausted => ErrorKind::Exhausted,
    }
}
