//! In-memory directory.
//!
//! Serves a fixed list of matches. Used when no upstream directory is
//! configured, and by tests.

use async_trait::async_trait;

use super::{DirectoryApi, Match};
use crate::error::{DirectoryError, DirectoryResult};
use crate::source::ChannelLocator;

/// A match together with its channels.
#[derive(Debug, Clone)]
struct Entry {
    info: Match,
    channels: Vec<ChannelLocator>,
}

/// Directory backed by a fixed, in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<Entry>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a match with `channels` given as `(title, locator)` pairs.
    /// Ids are assigned in insertion order.
    pub fn with_match(mut self, title: &str, url: &str, channels: &[(&str, &str)]) -> Self {
        let id = self.entries.len() as u64;
        let channels = channels
            .iter()
            .enumerate()
            .map(|(idx, (title, raw_url))| ChannelLocator::new(idx as u64, *title, *raw_url))
            .collect();
        self.entries.push(Entry {
            info: Match {
                id,
                title: title.to_string(),
                url: url.to_string(),
            },
            channels,
        });
        self
    }

    /// Built-in sample listing mixing relay and direct channels.
    pub fn sample() -> Self {
        Self::new()
            .with_match(
                "Everton - Sunderland",
                "https://gooool365.org/online/191987-jeverton-sanderlend.html",
                &[
                    ("Setanta Sports 1 HD", "relay://c58ddd8c6bb963fa78e6f79d2e3c6a15d93f8241"),
                    ("DAZN 2 HD", "relay://12ea555dd31dbe51fc8e4ca745aec09fe22a4865"),
                    ("SPORT TV 1 HD", "relay://af3e4e9fcc5a69848b7f8dd3fcf2cdde72bf1b4b"),
                ],
            )
            .with_match(
                "Manchester City - Chelsea",
                "https://gooool365.org/online/test-match-2.html",
                &[
                    ("Sky Sports 1", "https://example.com/stream1"),
                    ("BT Sport", "https://example.com/stream2"),
                ],
            )
            .with_match(
                "Liverpool - Arsenal",
                "https://gooool365.org/online/test-match-3.html",
                &[
                    ("Premier League HD", "relay://abc123def456ghi789jkl012mno345pqr678stu"),
                    ("Match TV", "https://example.com/stream3.m3u8"),
                ],
            )
    }

    fn entry(&self, id: u64) -> DirectoryResult<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.info.id == id)
            .ok_or_else(|| DirectoryError::NotFound(format!("match {}", id)))
    }
}

#[async_trait]
impl DirectoryApi for StaticDirectory {
    async fn list_matches(&self) -> DirectoryResult<Vec<Match>> {
        Ok(self.entries.iter().map(|entry| entry.info.clone()).collect())
    }

    async fn get_match(&self, id: u64) -> DirectoryResult<Match> {
        self.entry(id).map(|entry| entry.info.clone())
    }

    async fn get_channels(&self, match_id: u64) -> DirectoryResult<Vec<ChannelLocator>> {
        self.entry(match_id).map(|entry| entry.channels.clone())
    }
}
