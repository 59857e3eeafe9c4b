//! In-memory response store: LRU bound plus per-entry TTL.

use super::key::CacheKey;
use super::manager::{AtomicStats, CacheStats};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A cached successful response. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub body: String,
    pub status: u16,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn new(body: impl Into<String>, status: u16) -> Self {
        Self {
            body: body.into(),
            status,
            created_at: Instant::now(),
        }
    }

    #[inline]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Bounded, access-ordered cache of successful responses.
///
/// Every operation takes the single internal mutex for O(1) work (the sweep
/// is the one O(n) pass). Recency is updated on every hit; expiry is measured
/// from insertion and is not refreshed by reads.
pub struct ResponseCache {
    // `None` when constructed with zero capacity: the cache is disabled.
    entries: Option<Mutex<LruCache<CacheKey, CacheEntry>>>,
    ttl: Duration,
    stats: AtomicStats,
}

impl ResponseCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: NonZeroUsize::new(max_entries).map(|cap| Mutex::new(LruCache::new(cap))),
            ttl,
            stats: AtomicStats::default(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn lock(
        slot: &Mutex<LruCache<CacheKey, CacheEntry>>,
    ) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        // No operation leaves the map half-updated, so a poisoned lock is still usable.
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry, refreshing its recency. Expired entries are removed.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let Some(slot) = &self.entries else {
            self.stats.record_miss();
            return None;
        };
        let mut entries = Self::lock(slot);
        let lookup = entries
            .get(key)
            .map(|entry| (!entry.is_expired(self.ttl)).then(|| entry.clone()));
        match lookup {
            Some(Some(hit)) => {
                drop(entries);
                self.stats.record_hit();
                Some(hit)
            }
            Some(None) => {
                entries.pop(key);
                drop(entries);
                self.stats.record_expiration();
                self.stats.record_miss();
                None
            }
            None => {
                drop(entries);
                self.stats.record_miss();
                None
            }
        }
    }

    /// Store a successful response. Entries whose status is not 200 are refused.
    ///
    /// Returns whether the entry was stored.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) -> bool {
        if entry.status != 200 {
            return false;
        }
        let Some(slot) = &self.entries else {
            return false;
        };
        let mut entries = Self::lock(slot);
        let evicted = match entries.push(key.clone(), entry) {
            // `push` hands back the displaced pair; same key means an overwrite.
            Some((old_key, _)) => old_key != key,
            None => false,
        };
        drop(entries);
        self.stats.record_insert();
        if evicted {
            self.stats.record_eviction();
        }
        true
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        match &self.entries {
            Some(slot) => Self::lock(slot).pop(key).is_some(),
            None => false,
        }
    }

    pub fn clear(&self) {
        if let Some(slot) = &self.entries {
            Self::lock(slot).clear();
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let Some(slot) = &self.entries else {
            return 0;
        };
        let mut entries = Self::lock(slot);
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(self.ttl))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        drop(entries);
        for _ in &stale {
            self.stats.record_expiration();
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), "swept expired cache entries");
        }
        stale.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        match &self.entries {
            Some(slot) => Self::lock(slot).len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match &self.entries {
            Some(slot) => Self::lock(slot).cap().get(),
            None => 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::from(s)
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.put(key("a"), CacheEntry::new("body", 200)));
        let hit = cache.get(&key("a")).unwrap();
        assert_eq!(hit.body, "body");
        assert_eq!(hit.status, 200);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts), (1, 1, 1));
    }

    #[test]
    fn test_refuses_non_200() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        assert!(!cache.put(key("a"), CacheEntry::new("oops", 500)));
        assert!(!cache.put(key("b"), CacheEntry::new("", 201)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_respects_touch() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.put(key("k1"), CacheEntry::new("1", 200));
        cache.put(key("k2"), CacheEntry::new("2", 200));
        assert!(cache.get(&key("k1")).is_some());
        cache.put(key("k3"), CacheEntry::new("3", 200));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("k1")).is_some());
        assert!(cache.get(&key("k2")).is_none());
        assert!(cache.get(&key("k3")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_is_not_an_eviction() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        cache.put(key("a"), CacheEntry::new("1", 200));
        cache.put(key("a"), CacheEntry::new("2", 200));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("a")).unwrap().body, "2");
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = ResponseCache::new(0, Duration::from_secs(60));
        assert!(!cache.is_enabled());
        assert!(!cache.put(key("a"), CacheEntry::new("1", 200)));
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.capacity(), 0);
        assert_eq!(cache.sweep_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_on_read() {
        let cache = ResponseCache::new(10, Duration::from_secs(1));
        cache.put(key("a"), CacheEntry::new("1", 200));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cache.get(&key("a")).is_some());
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = ResponseCache::new(10, Duration::from_secs(10));
        cache.put(key("old"), CacheEntry::new("1", 200));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put(key("new"), CacheEntry::new("2", 200));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("new")).is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put(key("a"), CacheEntry::new("1", 200));
        cache.put(key("b"), CacheEntry::new("2", 200));
        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 10);
    }
}
