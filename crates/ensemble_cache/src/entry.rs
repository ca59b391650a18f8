//! Cache entries.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Kind of cached value; selects the default TTL.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntryType {
    /// Provider response for a task.
    Response,
    /// Result of a memory retrieval.
    MemoryLookup,
    /// Embedding vector.
    Embedding,
    /// Any other expensive computation.
    Computation,
}

/// Free-form labels stored alongside an entry.
pub type Metadata = BTreeMap<String, String>;

/// Cached value with expiry and access bookkeeping.
#[derive(Debug, Clone, Getters)]
pub struct CacheEntry<V> {
    key: String,
    value: V,
    entry_type: EntryType,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed: Instant,
    metadata: Metadata,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(
        key: String,
        value: V,
        entry_type: EntryType,
        ttl: Duration,
        metadata: Metadata,
        now: Instant,
    ) -> Self {
        Self {
            key,
            value,
            entry_type,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            metadata,
        }
    }

    /// Whether the entry's age strictly exceeds its TTL at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Whether the entry has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time until expiration, `None` once expired.
    pub fn time_remaining(&self) -> Option<Duration> {
        self.ttl.checked_sub(self.created_at.elapsed())
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Reads that returned a value.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Entries written.
    pub insertions: u64,
    /// Entries dropped to respect capacity.
    pub evictions: u64,
    /// Entries dropped because they expired.
    pub expirations: u64,
    /// Entries removed by explicit invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of reads that hit.
    pub fn hit_rate(&self) -> f64 {
        let reads = self.hits + self.misses;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}
