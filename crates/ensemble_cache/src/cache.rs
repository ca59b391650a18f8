//! Shared TTL + LRU result cache.

use crate::{CacheConfig, CacheEntry, CacheStats, EntryType, Metadata, stale_key};
use lru::LruCache;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

#[derive(Debug)]
struct CacheState<V> {
    entries: LruCache<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// Result cache for expensive idempotent lookups.
///
/// Entries expire once their age strictly exceeds their TTL; expiry is
/// checked on every read, and a [`CacheSweeper`](crate::CacheSweeper)
/// removes expired entries that are never read. When a write pushes the
/// cache past `max_entries`, least recently used entries are evicted.
///
/// All operations take `&self` and hold a single internal lock only for
/// the duration of the map operation.
///
/// # Example
///
/// ```
/// use ensemble_cache::{CacheConfig, EntryType, ResultCache};
/// use serde_json::json;
///
/// let cache = ResultCache::new(CacheConfig::default().with_max_entries(2));
/// cache.insert("a", json!(1), EntryType::Response);
/// cache.insert("b", json!(2), EntryType::Response);
///
/// assert_eq!(cache.get("a"), Some(json!(1)));
/// cache.insert("c", json!(3), EntryType::Response); // evicts "b"
/// assert_eq!(cache.get("b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
#[derive(Debug)]
pub struct ResultCache<V = serde_json::Value> {
    config: CacheConfig,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache with configuration.
    pub fn new(config: CacheConfig) -> Self {
        debug!(
            max_entries = config.max_entries(),
            default_ttl_secs = config.default_ttl_secs(),
            enabled = config.enabled(),
            "Creating new ResultCache"
        );
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                stats: CacheStats {
                    capacity: *config.max_entries(),
                    ..CacheStats::default()
                },
            }),
            config,
        }
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live value, promoting it to most recently used.
    ///
    /// Expired entries are removed and reported as a miss.
    #[instrument(skip(self), level = "debug")]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(|entry| entry.value().clone())
    }

    /// Look up a live entry with its bookkeeping.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        if !self.config.enabled() {
            return None;
        }

        let now = Instant::now();
        let mut state = self.lock();

        match state.entries.peek(key).map(|entry| entry.is_expired_at(now)) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(true) => {
                state.entries.pop(key);
                state.stats.expirations += 1;
                state.stats.misses += 1;
                debug!("Cache entry expired, removed");
                return None;
            }
            Some(false) => {}
        }

        let entry = state.entries.get_mut(key).map(|entry| {
            entry.touch(now);
            entry.clone()
        });
        state.stats.hits += 1;
        entry
    }

    /// Store a value with the TTL configured for its type.
    pub fn insert(&self, key: impl Into<String>, value: V, entry_type: EntryType) {
        self.put(key, value, entry_type, None, Metadata::new());
    }

    /// Store a value, replacing any existing entry for the key.
    ///
    /// `ttl` defaults to the TTL configured for `entry_type`. Least
    /// recently used entries are evicted while the cache is over capacity.
    #[instrument(skip(self, key, value, metadata), fields(key = tracing::field::Empty))]
    pub fn put(
        &self,
        key: impl Into<String>,
        value: V,
        entry_type: EntryType,
        ttl: Option<Duration>,
        metadata: Metadata,
    ) {
        if !self.config.enabled() {
            debug!("Cache disabled, skipping put");
            return;
        }

        let key = key.into();
        tracing::Span::current().record("key", key.as_str());
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_for(entry_type));
        let entry = CacheEntry::new(key.clone(), value, entry_type, ttl, metadata, Instant::now());

        let mut state = self.lock();
        state.entries.pop(&key);
        state.entries.put(key, entry);
        state.stats.insertions += 1;

        while state.entries.len() > *self.config.max_entries() {
            match state.entries.pop_lru() {
                Some((evicted, _)) => {
                    debug!(evicted = %evicted, "Evicting LRU entry");
                    state.stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Store a value and a long-lived copy for cached fallbacks.
    pub fn put_with_stale_copy(&self, key: &str, value: V, entry_type: EntryType) {
        self.put(
            stale_key(key),
            value.clone(),
            entry_type,
            Some(self.config.stale_ttl()),
            Metadata::new(),
        );
        self.put(key, value, entry_type, None, Metadata::new());
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.lock();
        let removed = state.entries.pop(key).is_some();
        if removed {
            state.stats.invalidations += 1;
        }
        removed
    }

    /// Remove every entry whose key contains `pattern`.
    ///
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub fn invalidate_by_pattern(&self, pattern: &str) -> usize {
        let mut state = self.lock();
        let matching: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &matching {
            state.entries.pop(key);
        }
        state.stats.invalidations += matching.len() as u64;
        if !matching.is_empty() {
            info!(removed = matching.len(), "Invalidated cache entries by pattern");
        }
        matching.len()
    }

    /// Remove expired entries regardless of access.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        state.stats.expirations += expired.len() as u64;
        if !expired.is_empty() {
            info!(
                removed = expired.len(),
                remaining = state.entries.len(),
                "Cleaned up expired cache entries"
            );
        }
        expired.len()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        info!(cleared = count, "Cleared cache");
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is held and live, without promoting it.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
