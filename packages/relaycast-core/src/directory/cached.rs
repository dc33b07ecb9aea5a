//! Memoizing directory wrapper.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DirectoryApi, Match};
use crate::cache::ResultCache;
use crate::error::DirectoryResult;
use crate::source::ChannelLocator;
use crate::state::CacheConfig;

const MATCHES_KEY: &str = "matches";

/// Wraps a directory with TTL caches.
///
/// Concurrent lookups of the same key share one upstream request; failures
/// are never cached.
pub struct CachedDirectory {
    inner: Arc<dyn DirectoryApi>,
    config: CacheConfig,
    matches: ResultCache<Vec<Match>>,
    match_by_id: ResultCache<Match>,
    channels: ResultCache<Vec<ChannelLocator>>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn DirectoryApi>, config: CacheConfig) -> Self {
        Self {
            inner,
            config,
            matches: ResultCache::new(),
            match_by_id: ResultCache::new(),
            channels: ResultCache::new(),
        }
    }

    /// Drops every cached lookup so the next read goes upstream.
    pub fn refresh(&self) {
        self.matches.clear();
        self.match_by_id.clear();
        self.channels.clear();
        log::info!("[Directory] Cache cleared");
    }

    /// Drops the cached channel list of one match.
    pub fn invalidate_channels(&self, match_id: u64) {
        self.channels.delete(&match_id.to_string());
        log::debug!("[Directory] Channel cache dropped for match {}", match_id);
    }
}

#[async_trait]
impl DirectoryApi for CachedDirectory {
    async fn list_matches(&self) -> DirectoryResult<Vec<Match>> {
        self.matches
            .get_or_fetch(MATCHES_KEY, self.config.matches_ttl(), || {
                self.inner.list_matches()
            })
            .await
    }

    async fn get_match(&self, id: u64) -> DirectoryResult<Match> {
        self.match_by_id
            .get_or_fetch(&id.to_string(), self.config.matches_ttl(), || {
                self.inner.get_match(id)
            })
            .await
    }

    async fn get_channels(&self, match_id: u64) -> DirectoryResult<Vec<ChannelLocator>> {
        self.channels
            .get_or_fetch(&match_id.to_string(), self.config.channels_ttl(), || {
                self.inner.get_channels(match_id)
            })
            .await
    }
}
