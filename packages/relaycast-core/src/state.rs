//! Core configuration types.
//!
//! [`Config`] groups every tunable used by the core: retry policy, session
//! timings, cache TTLs and the directory client. All fields have defaults
//! matching the canonical retry protocol, so an empty YAML document is a
//! valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::MIN_RELAY_ENDPOINTS;
use crate::source::default_endpoint_templates;

/// Retry and failover policy for the playback state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed per candidate for transient failures.
    pub max_attempts: u32,

    /// Delay before the first retry of a candidate (milliseconds).
    pub base_delay_ms: u64,

    /// Growth factor applied to the delay for each subsequent retry.
    pub backoff_multiplier: f64,

    /// Fixed delay before loading the next candidate (milliseconds).
    pub advance_delay_ms: u64,

    /// Watchdog for direct sources (milliseconds).
    pub direct_watchdog_ms: u64,

    /// Watchdog for relay sources, which are slower to establish (milliseconds).
    pub relay_watchdog_ms: u64,
}

impl RetryPolicy {
    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay before loading the next candidate.
    pub fn advance_delay(&self) -> Duration {
        Duration::from_millis(self.advance_delay_ms)
    }

    /// Validates the policy values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("playback.max_attempts must be >= 1".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("playback.backoff_multiplier must be a finite value >= 1.0".to_string());
        }
        if self.direct_watchdog_ms == 0 || self.relay_watchdog_ms == 0 {
            return Err("playback watchdog timeouts must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            backoff_multiplier: 1.5,
            advance_delay_ms: 2000,
            direct_watchdog_ms: 15_000,
            relay_watchdog_ms: 30_000,
        }
    }
}

/// Channel session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay between a terminal failure and the automatic advance to the
    /// next channel (milliseconds).
    pub settle_delay_ms: u64,

    /// Maximum number of concurrently open sessions.
    pub max_sessions: usize,
}

impl SessionConfig {
    /// Settle delay as a [`Duration`].
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            max_sessions: 16,
        }
    }
}

/// Time-to-live settings for memoized directory lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for the match list and individual matches (seconds).
    pub matches_ttl_secs: u64,

    /// TTL for per-match channel lists (seconds).
    pub channels_ttl_secs: u64,
}

impl CacheConfig {
    pub fn matches_ttl(&self) -> Duration {
        Duration::from_secs(self.matches_ttl_secs)
    }

    pub fn channels_ttl(&self) -> Duration {
        Duration::from_secs(self.channels_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            matches_ttl_secs: 300,
            channels_ttl_secs: 300,
        }
    }
}

/// Directory API client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL of the directory API. `None` serves the static fixture list.
    pub base_url: Option<String>,

    /// Per-request timeout (seconds). Render engines only apply it to
    /// connecting; their loads are bounded by the playback watchdog.
    pub request_timeout_secs: u64,

    /// Total attempts per request, including the first.
    pub retry_attempts: u32,

    /// Delay before the first retry; doubles on each further attempt (milliseconds).
    pub retry_base_delay_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: crate::protocol_constants::DIRECTORY_TIMEOUT_SECS,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

/// Configuration for the Relaycast core.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    // Playback
    /// Retry/failover policy.
    pub playback: RetryPolicy,

    /// Channel session behaviour.
    pub session: SessionConfig,

    // Lookups
    /// Cache TTLs.
    pub cache: CacheConfig,

    /// Directory client.
    pub directory: DirectoryConfig,

    /// Relay endpoint templates in priority order. Each candidate URL is
    /// built as `template?id=<relay-id>`.
    pub relay_endpoints: Vec<String>,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first value that would break runtime
    /// invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.playback.validate()?;
        if self.relay_endpoints.len() < MIN_RELAY_ENDPOINTS {
            return Err(format!(
                "relay_endpoints must list at least {} endpoints (got {})",
                MIN_RELAY_ENDPOINTS,
                self.relay_endpoints.len()
            ));
        }
        if self.relay_endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err("relay_endpoints must not contain blank entries".to_string());
        }
        if self.session.max_sessions == 0 {
            return Err("session.max_sessions must be >= 1".to_string());
        }
        if self.directory.retry_attempts == 0 {
            return Err("directory.retry_attempts must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            playback: RetryPolicy::default(),
            session: SessionConfig::default(),
            cache: CacheConfig::default(),
            directory: DirectoryConfig::default(),
            relay_endpoints: default_endpoint_templates(),
            event_channel_capacity: crate::protocol_constants::EVENT_CHANNEL_CAPACITY,
        }
    }
}
