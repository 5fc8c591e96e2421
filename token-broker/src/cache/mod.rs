//! Expiring key-value cache.
//!
//! Each entry carries its own TTL. Reads never return an expired entry:
//! expiry is checked lazily on access, and an optional background sweep
//! reclaims entries nobody reads anymore.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use douyin_openapi::mask;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest TTL an entry can get; longer requests are capped.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Key as logged: a `prefix:` namespace is kept, the identifier is masked.
fn log_key(key: &str) -> String {
    match key.split_once(':') {
        Some((namespace, id)) => format!("{namespace}:{}", mask(id)),
        None => mask(key),
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    expired: AtomicU64,
}

/// Statistics about the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet reclaimed.
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries reclaimed after their TTL elapsed.
    pub expired: u64,
}

/// Thread-safe string-keyed cache with per-entry TTL.
pub struct ExpiringCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            counters: Counters::default(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Store `value`, replacing any previous entry. It stays visible for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let ttl = ttl.min(MAX_ENTRY_TTL);
        let expires_at = self.clock.now() + ttl;
        debug!(key = %log_key(&key), ttl_secs = ttl.as_secs(), "cache set");
        self.entries.insert(key, CacheEntry { value, expires_at });
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a live entry. An expired entry found here is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let Some(entry) = self.entries.get(key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if !entry.is_expired(now) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        drop(entry); // Release the shard lock before removing
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
            debug!(key = %log_key(key), "cache expired");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Time left before `key` expires, if it is live.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        (!entry.is_expired(now)).then(|| entry.expires_at - now)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.remaining_ttl(key).is_some()
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            debug!(key = %log_key(key), "cache delete");
        }
        removed
    }

    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!(entries = count, "cache clear");
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            self.counters
                .expired
                .fetch_add(purged as u64, Ordering::Relaxed);
            debug!(purged, "cache sweep");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }

    /// Spawn a task purging expired entries every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }
        })
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_clock() -> (ExpiringCache<String>, ManualClock) {
        let clock = ManualClock::new();
        (ExpiringCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_entry_visible_until_ttl_elapses() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(10));

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_set_replaces_value_and_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "old".to_string(), Duration::from_secs(5));
        clock.advance(Duration::from_secs(4));
        cache.set("k", "new".to_string(), Duration::from_secs(5));
        clock.advance(Duration::from_secs(4));

        assert_eq!(cache.get("k").as_deref(), Some("new"));
        assert_eq!(cache.remaining_ttl("k"), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_delete_and_clear() {
        let (cache, _) = cache_with_clock();
        cache.set("a", "1".to_string(), Duration::from_secs(5));
        cache.set("b", "2".to_string(), Duration::from_secs(5));

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert!(cache.contains("b"));

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().deletes, 1);
    }

    #[test]
    fn test_purge_removes_only_expired() {
        let (cache, clock) = cache_with_clock();
        cache.set("short", "1".to_string(), Duration::from_secs(1));
        cache.set("long", "2".to_string(), Duration::from_secs(100));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));
    }

    #[test]
    fn test_huge_ttl_is_capped() {
        let (cache, clock) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::MAX);
        assert_eq!(cache.remaining_ttl("k"), Some(MAX_ENTRY_TTL));

        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_log_key_masks_identifier_after_namespace() {
        assert_eq!(log_key("session:1234567890abc"), "session:12345678...");
        assert_eq!(log_key("access_token:u1"), "access_token:u1");
        assert_eq!(log_key("1234567890abc"), "12345678...");
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let (cache, _) = cache_with_clock();
        cache.set("k", "v".to_string(), Duration::from_secs(5));
        cache.get("k");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[tokio::test]
    async fn test_sweeper_purges_and_stops_on_cancel() {
        let clock = ManualClock::new();
        let cache = Arc::new(ExpiringCache::with_clock(Arc::new(clock.clone())));
        cache.set("k", "v".to_string(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(2));

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
