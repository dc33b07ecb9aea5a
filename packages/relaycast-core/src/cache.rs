//! Ephemeral result cache with TTL expiry and request deduplication.
//!
//! Memoizes expensive directory lookups (match list, channel lists). Entries
//! are checked for expiry only when read; there is no background sweeper,
//! since keys are few and bounded (one per match or channel list).
//!
//! [`ResultCache::get_or_fetch`] keeps at most one fetch in flight per key:
//! concurrent callers for the same key wait on the running fetch instead of
//! issuing their own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;

/// A cached value with the time it was stored and how long it stays valid.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// An entry whose age equals its TTL is still fresh.
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Shared slot that concurrent fetchers of one key wait on.
type InFlight<V> = Arc<OnceCell<V>>;

/// Process-local TTL cache keyed by string.
///
/// Uses `DashMap` for concurrent access. Cloning is cheap only when wrapped
/// in an `Arc`; the cache itself owns its maps.
pub struct ResultCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    in_flight: DashMap<String, InFlight<V>>,
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Returns the value for `key` if it was set and has not expired.
    ///
    /// Expired entries are evicted on this read.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;

        if entry.is_expired() {
            drop(entry); // Release the shard lock before removing
            self.entries.remove_if(key, |_, e| e.is_expired());
            log::debug!("[Cache] Evicted expired entry '{}'", key);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Removes a single entry.
    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        log::debug!("[Cache] Cleared {} entr(ies)", count);
    }

    /// Number of stored entries, including ones that expired but were not
    /// read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches its
    /// successful result for `ttl`.
    ///
    /// Only one fetch per key runs at a time. Callers arriving while a fetch
    /// is running wait for it and share its value. If the running fetch
    /// fails, one waiting caller runs its own fetch next. Errors are never
    /// cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let slot: InFlight<V> = self
            .in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_try_init(|| async {
                log::debug!("[Cache] Miss for '{}', fetching", key);
                let value = fetch().await?;
                self.set(key, value.clone(), ttl);
                Ok::<V, E>(value)
            })
            .await
            .cloned();

        if slot.initialized() {
            // Only drop the slot we waited on; a newer one may already exist.
            self.in_flight
                .remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
        }

        result
    }
}

impl<V> Default for ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn value_is_readable_within_ttl_and_absent_after() {
        let cache = ResultCache::new();
        cache.set("k", 7u32, Duration::from_millis(100));

        assert_eq!(cache.get("k"), Some(7));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty(), "expired entry should be evicted on read");
    }

    #[tokio::test(start_paused = true)]
    async fn entry_at_exact_ttl_is_still_fresh() {
        let cache = ResultCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = ResultCache::new();
        cache.set("k", 1u32, Duration::from_secs(60));
        cache.set("k", 2u32, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test]
    async fn delete_and_clear_invalidate() {
        let cache = ResultCache::new();
        cache.set("a", 1u32, Duration::from_secs(60));
        cache.set("b", 2u32, Duration::from_secs(60));

        cache.delete("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));

        cache.clear();
        assert_eq!(cache.get("b"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn get_or_fetch_uses_cached_value() {
        let cache = ResultCache::new();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("k", Duration::from_secs(60), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_fetches_are_deduplicated() {
        let cache = Arc::new(ResultCache::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("matches", Duration::from_secs(60), || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(vec![1u32, 2, 3])
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache: ResultCache<u32> = ResultCache::new();

        let err = cache
            .get_or_fetch("k", Duration::from_secs(60), || async {
                Err::<u32, _>("upstream down".to_string())
            })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.get("k"), None);

        let ok = cache
            .get_or_fetch("k", Duration::from_secs(60), || async { Ok::<_, String>(5) })
            .await;
        assert_eq!(ok, Ok(5));
        assert_eq!(cache.get("k"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_value_is_refetched() {
        let cache = ResultCache::new();
        let calls = AtomicU32::new(0);
        let ttl = Duration::from_millis(100);

        let fetch = || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(n)
        };

        assert_eq!(cache.get_or_fetch("k", ttl, fetch).await, Ok(0));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cache.get_or_fetch("k", ttl, fetch).await, Ok(1));
    }
}
