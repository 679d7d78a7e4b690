//! TTL-bounded, size-bounded snapshot cache keyed by filter scope.
//!
//! Pure value store: an absent key is a normal outcome, not a failure.
//! Entries are never explicitly destroyed on unsubscribe; they age out or
//! get evicted when the size bound is exceeded.

use crate::clock::SharedClock;
use crate::config::SyncConfig;
use chrono::Duration as ChronoDuration;
use reviewroom_core::{CacheKey, ReviewSnapshot, Timestamp};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// A cached snapshot with its storage time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: ReviewSnapshot,
    pub stored_at: Timestamp,
}

/// In-memory snapshot store.
///
/// At most one entry exists per key (last write wins). The store is
/// bounded; exceeding the bound evicts the least-recently-stored entry.
pub struct CacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    fresh_ttl: ChronoDuration,
    stale_ttl: ChronoDuration,
    max_entries: usize,
    clock: SharedClock,
}

impl CacheStore {
    pub fn new(config: &SyncConfig, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fresh_ttl: ChronoDuration::from_std(config.cache_fresh_ttl)
                .unwrap_or(ChronoDuration::MAX),
            stale_ttl: ChronoDuration::from_std(config.cache_stale_ttl)
                .unwrap_or(ChronoDuration::MAX),
            max_entries: config.cache_max_entries,
            clock,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Store a snapshot under `key` with `stored_at = now`, evicting the
    /// oldest entry when the bound is exceeded.
    pub fn put(&self, key: CacheKey, payload: ReviewSnapshot) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            CacheEntry {
                payload,
                stored_at: self.clock.now(),
            },
        );
        while entries.len() > self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!(key = %key, "evicting least-recently-stored cache entry");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if self.entries.write().unwrap().remove(key).is_some() {
            debug!(key = %key, "invalidated cache entry");
        }
    }

    /// True while the entry is inside the fresh window and can be served
    /// without any transport activity.
    pub fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.clock.now() - entry.stored_at < self.fresh_ttl
    }

    /// True while the entry is usable as a degraded fallback when no
    /// transport is available.
    pub fn is_usable_stale(&self, entry: &CacheEntry) -> bool {
        self.clock.now() - entry.stored_at < self.stale_ttl
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use reviewroom_core::FilterSet;
    use std::sync::Arc;

    fn key(year: &str) -> CacheKey {
        FilterSet::new(year, "SCOPE", "CSE", "guide").cache_key()
    }

    fn store_with_clock() -> (CacheStore, ManualClock) {
        let clock = ManualClock::default();
        let store = CacheStore::new(&SyncConfig::default(), Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_absent_key_is_normal() {
        let (store, _clock) = store_with_clock();
        assert!(store.get(&key("2025-26")).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let (store, _clock) = store_with_clock();
        let key = key("2025-26");
        let mut snapshot = ReviewSnapshot::default();
        store.put(key.clone(), snapshot.clone());
        snapshot.statistics = Some(serde_json::json!({"total": 1}));
        store.put(key.clone(), snapshot.clone());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).unwrap().payload, snapshot);
    }

    #[test]
    fn test_freshness_boundaries() {
        let (store, clock) = store_with_clock();
        let key = key("2025-26");
        store.put(key.clone(), ReviewSnapshot::default());
        let entry = store.get(&key).unwrap();

        clock.advance(chrono::Duration::milliseconds(29_999));
        assert!(store.is_fresh(&entry));
        clock.advance(chrono::Duration::milliseconds(1));
        assert!(!store.is_fresh(&entry));
        assert!(store.is_usable_stale(&entry));

        clock.advance(chrono::Duration::seconds(570));
        assert!(!store.is_usable_stale(&entry));
    }

    #[test]
    fn test_size_bound_evicts_oldest_first() {
        let clock = ManualClock::default();
        let config = SyncConfig::default().with_cache_max_entries(3);
        let store = CacheStore::new(&config, Arc::new(clock.clone()));

        for year in ["a", "b", "c", "d"] {
            store.put(key(year), ReviewSnapshot::default());
            clock.advance(chrono::Duration::seconds(1));
        }

        assert_eq!(store.len(), 3);
        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("b")).is_some());
        assert!(store.get(&key("d")).is_some());
    }

    #[test]
    fn test_bound_holds_for_any_put_sequence() {
        let clock = ManualClock::default();
        let config = SyncConfig::default().with_cache_max_entries(50);
        let store = CacheStore::new(&config, Arc::new(clock.clone()));

        for i in 0..200 {
            store.put(key(&format!("year-{i}")), ReviewSnapshot::default());
            clock.advance(chrono::Duration::milliseconds(10));
            assert!(store.len() <= 50);
        }
        assert_eq!(store.len(), 50);
        // The survivors are the 50 most recently stored.
        assert!(store.get(&key("year-149")).is_none());
        assert!(store.get(&key("year-150")).is_some());
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let (store, _clock) = store_with_clock();
        let key = key("2025-26");
        store.put(key.clone(), ReviewSnapshot::default());
        store.invalidate(&key);
        assert!(store.get(&key).is_none());
        // Idempotent on absent keys.
        store.invalidate(&key);
    }
}
