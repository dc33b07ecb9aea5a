//! HTTP client for a remote directory.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::{ApiResponse, DirectoryApi, Match};
use crate::error::{DirectoryError, DirectoryResult};
use crate::source::ChannelLocator;
use crate::state::DirectoryConfig;
use crate::utils::backoff_delay;

/// Directory backed by the REST API:
///
/// - `GET {base}/api/matches`
/// - `GET {base}/api/match/{id}`
/// - `GET {base}/api/channels/{match_id}`
///
/// Network failures and 5xx responses are retried with exponential backoff;
/// 404 surfaces as [`DirectoryError::NotFound`] immediately.
pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
    attempts: u32,
    base_delay: Duration,
}

impl HttpDirectoryClient {
    pub fn new(client: Client, base_url: impl Into<String>, config: &DirectoryConfig) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> DirectoryResult<T> {
        let url = format!("{}{}", self.base_url, path);
        self.with_retry(path, || self.fetch_once(&url)).await
    }

    async fn fetch_once<T: DeserializeOwned>(&self, url: &str) -> DirectoryResult<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DirectoryError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(DirectoryError::Upstream(format!("HTTP {}", status)));
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            if e.is_decode() {
                DirectoryError::Decode(e.to_string())
            } else {
                DirectoryError::Network(e.to_string())
            }
        })?;
        envelope.into_result()
    }

    /// Runs `operation`, retrying transient errors with doubling delays.
    async fn with_retry<T, F, Fut>(&self, action: &str, mut operation: F) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let delay = backoff_delay(self.base_delay, 2.0, attempt - 1);
                    log::warn!(
                        "[Directory] {} failed ({}), retrying (attempt {}/{}) after {}ms",
                        action,
                        e,
                        attempt + 1,
                        self.attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("[Directory] {} failed: {}", action, e);
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl DirectoryApi for HttpDirectoryClient {
    async fn list_matches(&self) -> DirectoryResult<Vec<Match>> {
        self.fetch("/api/matches").await
    }

    async fn get_match(&self, id: u64) -> DirectoryResult<Match> {
        self.fetch(&format!("/api/match/{}", id)).await
    }

    async fn get_channels(&self, match_id: u64) -> DirectoryResult<Vec<ChannelLocator>> {
        self.fetch(&format!("/api/channels/{}", match_id)).await
    }
}
