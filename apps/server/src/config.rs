//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use relaycast_core::{CacheConfig, DirectoryConfig, RetryPolicy};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 picks a free port).
    /// Override: `RELAYCAST_BIND_PORT`
    pub bind_port: u16,

    /// Relay endpoint templates in priority order. Empty keeps the
    /// built-in table.
    pub relay_endpoints: Vec<String>,

    /// Maximum number of concurrently open sessions.
    /// Override: `RELAYCAST_MAX_SESSIONS`
    pub max_sessions: usize,

    /// Delay before auto-advancing after a channel fails (milliseconds).
    /// Override: `RELAYCAST_SETTLE_DELAY_MS`
    pub settle_delay_ms: u64,

    /// Retry and failover policy.
    pub playback: RetryPolicy,

    /// Directory cache TTLs.
    pub cache: CacheConfig,

    /// Directory API client. Without a `base_url` the built-in fixture
    /// matches are served.
    /// Overrides: `RELAYCAST_DIRECTORY_URL`, `RELAYCAST_DIRECTORY_TIMEOUT_SECS`
    pub directory: DirectoryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = relaycast_core::Config::default();
        Self {
            bind_port: 49500,
            relay_endpoints: Vec::new(),
            max_sessions: core.session.max_sessions,
            settle_delay_ms: core.session.settle_delay_ms,
            playback: core.playback,
            cache: core.cache,
            directory: core.directory,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RELAYCAST_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("RELAYCAST_DIRECTORY_URL") {
            self.set_directory_url(val);
        }

        if let Ok(val) = std::env::var("RELAYCAST_DIRECTORY_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.directory.request_timeout_secs = secs;
            }
        }

        if let Ok(val) = std::env::var("RELAYCAST_MAX_SESSIONS") {
            if let Ok(max) = val.parse() {
                self.max_sessions = max;
            }
        }

        if let Ok(val) = std::env::var("RELAYCAST_SETTLE_DELAY_MS") {
            if let Ok(delay) = val.parse() {
                self.settle_delay_ms = delay;
            }
        }
    }

    /// Points the directory client at `url`. Blank values are ignored.
    pub fn set_directory_url(&mut self, url: String) {
        if !url.trim().is_empty() {
            self.directory.base_url = Some(url);
        }
    }

    /// Converts to relaycast-core's Config type.
    pub fn to_core_config(&self) -> relaycast_core::Config {
        let mut config = relaycast_core::Config {
            preferred_port: self.bind_port,
            playback: self.playback.clone(),
            cache: self.cache.clone(),
            directory: self.directory.clone(),
            ..Default::default()
        };
        config.session.max_sessions = self.max_sessions;
        config.session.settle_delay_ms = self.settle_delay_ms;
        if !self.relay_endpoints.is_empty() {
            config.relay_endpoints = self.relay_endpoints.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: ServerConfig = serde_yaml::from_str(
            "bind_port: 8080\nplayback:\n  max_attempts: 5\n",
        )
        .unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.playback.max_attempts, 5);
        assert_eq!(config.playback.base_delay_ms, 2000);
        assert!(config.directory.base_url.is_none());
        assert_eq!(config.directory.retry_attempts, 3);
    }

    #[test]
    fn directory_section_carries_through_to_core() {
        let yaml = "\
directory:
  base_url: http://directory.local
  request_timeout_secs: 4
  retry_attempts: 5
";
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.directory.retry_base_delay_ms, 1000);

        let core = config.to_core_config();
        assert_eq!(core.directory.base_url.as_deref(), Some("http://directory.local"));
        assert_eq!(core.directory.request_timeout_secs, 4);
        assert_eq!(core.directory.retry_attempts, 5);
        assert_eq!(core.directory.retry_base_delay_ms, 1000);
        assert!(core.validate().is_ok());
    }

    #[test]
    fn blank_directory_url_is_ignored() {
        let mut config = ServerConfig::default();
        config.set_directory_url("  ".into());
        assert!(config.directory.base_url.is_none());

        config.set_directory_url("http://directory.local".into());
        assert_eq!(config.directory.base_url.as_deref(), Some("http://directory.local"));
    }

    #[test]
    fn core_config_keeps_builtin_endpoints_when_unset() {
        let core = ServerConfig::default().to_core_config();
        assert!(!core.relay_endpoints.is_empty());
        assert!(core.validate().is_ok());
    }

    #[test]
    fn custom_endpoints_replace_builtin_table() {
        let config = ServerConfig {
            relay_endpoints: vec![
                "http://127.0.0.1:6878/ace/getstream".into(),
                "http://127.0.0.1:6879/ace/getstream".into(),
                "http://127.0.0.1:6880/ace/getstream".into(),
            ],
            ..ServerConfig::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.relay_endpoints.len(), 3);
        assert_eq!(core.relay_endpoints[0], "http://127.0.0.1:6878/ace/getstream");
        assert!(core.validate().is_ok());
    }

    #[test]
    fn too_few_custom_endpoints_fail_validation() {
        let config = ServerConfig {
            relay_endpoints: vec!["http://127.0.0.1:6878/ace/getstream".into()],
            ..ServerConfig::default()
        };
        assert!(config.to_core_config().validate().is_err());
    }
}
