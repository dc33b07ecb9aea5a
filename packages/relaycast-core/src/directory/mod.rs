//! Match/channel directory.
//!
//! The directory is an external collaborator: it lists matches and the
//! channels available for each. [`DirectoryApi`] is the seam; implementations:
//!
//! - [`HttpDirectoryClient`]: remote directory speaking the
//!   `{success, data, error}` envelope, with bounded retry
//! - [`StaticDirectory`]: in-memory fixture list
//! - [`CachedDirectory`]: TTL memoization over any of the above

mod cached;
mod client;
mod fixtures;

pub use cached::CachedDirectory;
pub use client::HttpDirectoryClient;
pub use fixtures::StaticDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::source::ChannelLocator;

/// A match (event) listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    /// Page the match was scraped from.
    #[serde(default)]
    pub url: String,
}

/// Response envelope used by the directory API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Unwraps the payload, turning `success: false` or a missing payload
    /// into an upstream error.
    pub fn into_result(self) -> DirectoryResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(DirectoryError::Decode("missing data".to_string())),
            (false, _) => Err(DirectoryError::Upstream(
                self.error.unwrap_or_else(|| "request failed".to_string()),
            )),
        }
    }
}

/// Source of matches and their channel lists.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Lists every known match.
    async fn list_matches(&self) -> DirectoryResult<Vec<Match>>;

    /// Looks up one match.
    async fn get_match(&self, id: u64) -> DirectoryResult<Match>;

    /// Lists the channels for a match, in playback order.
    async fn get_channels(&self, match_id: u64) -> DirectoryResult<Vec<ChannelLocator>>;
}
