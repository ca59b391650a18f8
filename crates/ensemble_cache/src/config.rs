//! Cache configuration.

use crate::{CacheError, CacheErrorKind, CacheResult, EntryType};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the result cache.
///
/// ```toml
/// [cache]
/// max_entries = 1000
/// default_ttl_secs = 3600
/// sweep_interval_secs = 300
///
/// [cache.type_ttls]
/// embedding = 86400
/// memory_lookup = 600
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction.
    #[serde(default = "default_max_entries")]
    max_entries: usize,

    /// TTL for entries whose type has no override (seconds).
    #[serde(default = "default_ttl_secs")]
    default_ttl_secs: u64,

    /// Per-entry-type TTL overrides (seconds), keyed by type name.
    #[serde(default)]
    type_ttls: HashMap<String, u64>,

    /// TTL of the long-lived copies kept for cached fallbacks (seconds).
    #[serde(default = "default_stale_ttl_secs")]
    stale_ttl_secs: u64,

    /// Interval between background sweeps (seconds).
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,

    /// Whether caching is enabled.
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_max_entries() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_stale_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
            type_ttls: HashMap::new(),
            stale_ttl_secs: default_stale_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            enabled: default_enabled(),
        }
    }
}

impl CacheConfig {
    /// TTL applied to entries of `entry_type` when none is given.
    pub fn ttl_for(&self, entry_type: EntryType) -> Duration {
        let secs = self
            .type_ttls
            .get(entry_type.as_ref())
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }

    /// TTL of long-lived fallback copies.
    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.stale_ttl_secs)
    }

    /// Interval between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero capacity, a zero sweep interval, or a
    /// TTL override naming an unknown entry type.
    pub fn validate(&self) -> CacheResult<()> {
        if self.max_entries == 0 {
            return Err(CacheError::new(CacheErrorKind::Config(
                "max_entries must be greater than 0".to_string(),
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(CacheError::new(CacheErrorKind::Config(
                "sweep_interval_secs must be greater than 0".to_string(),
            )));
        }
        if let Some(unknown) = self
            .type_ttls
            .keys()
            .find(|name| name.parse::<EntryType>().is_err())
        {
            return Err(CacheError::new(CacheErrorKind::Config(format!(
                "type_ttls names unknown entry type '{}'",
                unknown
            ))));
        }
        Ok(())
    }
}
