//! TTL and LRU result caching.
//!
//! [`ResultCache`] stores results of expensive idempotent lookups keyed by
//! a deterministic string derived from every input that affects the
//! result (see [`cache_key`]). The cache is content-agnostic and shared
//! process-wide by reference.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod entry;
mod error;
mod key;
mod sweeper;

pub use cache::ResultCache;
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheStats, EntryType, Metadata};
pub use error::{CacheError, CacheErrorKind, CacheResult};
pub use key::{cache_key, cache_key_json, stale_key};
pub use sweeper::CacheSweeper;
