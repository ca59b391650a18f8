//! Tests for TTL expiry, LRU eviction, and invalidation.

use ensemble_cache::{CacheConfig, EntryType, Metadata, ResultCache};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn cache(max_entries: usize) -> ResultCache {
    ResultCache::new(CacheConfig::default().with_max_entries(max_entries))
}

#[tokio::test(start_paused = true)]
async fn test_value_live_until_ttl_then_miss() {
    let cache = cache(10);
    cache.put(
        "k",
        json!("v"),
        EntryType::Response,
        Some(Duration::from_secs(10)),
        Metadata::new(),
    );

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(cache.get("k"), Some(json!("v")));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.get("k"), None);
    assert!(cache.is_empty(), "expired entry should be removed on read");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.expirations, 1);
}

#[test]
fn test_capacity_evicts_exactly_least_recently_used() {
    let cache = cache(3);
    cache.insert("a", json!(1), EntryType::Response);
    cache.insert("b", json!(2), EntryType::Response);
    cache.insert("c", json!(3), EntryType::Response);

    // Touch "a" so "b" becomes least recently used.
    assert_eq!(cache.get("a"), Some(json!(1)));
    cache.insert("d", json!(4), EntryType::Response);

    assert_eq!(cache.len(), 3);
    assert!(!cache.contains("b"));
    for key in ["a", "c", "d"] {
        assert!(cache.contains(key), "{} should survive", key);
    }
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_put_replaces_existing_key() {
    let cache = cache(2);
    cache.insert("a", json!(1), EntryType::Response);
    cache.insert("b", json!(2), EntryType::Response);
    cache.insert("a", json!(10), EntryType::Response);

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("a"), Some(json!(10)));
    assert_eq!(cache.stats().evictions, 0);

    // "b" is now least recently used.
    cache.insert("c", json!(3), EntryType::Response);
    assert!(!cache.contains("b"));
}

#[test]
fn test_entry_bookkeeping() {
    let cache = cache(4);
    let mut metadata = Metadata::new();
    metadata.insert("expert".to_string(), "statistician".to_string());
    cache.put("k", json!({"x": 1}), EntryType::MemoryLookup, None, metadata);

    cache.get("k");
    let entry = cache.get_entry("k").unwrap();
    assert_eq!(*entry.access_count(), 2);
    assert_eq!(*entry.entry_type(), EntryType::MemoryLookup);
    assert_eq!(entry.metadata().get("expert").map(String::as_str), Some("statistician"));
    assert_eq!(*entry.ttl(), Duration::from_secs(3600));
}

#[test]
fn test_type_ttl_override() {
    let mut ttls = std::collections::HashMap::new();
    ttls.insert("embedding".to_string(), 86_400);
    let config = CacheConfig::default().with_type_ttls(ttls);

    assert_eq!(config.ttl_for(EntryType::Embedding), Duration::from_secs(86_400));
    assert_eq!(config.ttl_for(EntryType::Response), Duration::from_secs(3600));
    assert!(config.validate().is_ok());

    let mut bad = std::collections::HashMap::new();
    bad.insert("vectors".to_string(), 5);
    assert!(CacheConfig::default().with_type_ttls(bad).validate().is_err());
}

#[test]
fn test_invalidation() {
    let cache = cache(10);
    cache.insert("memory:game-1:a", json!(1), EntryType::MemoryLookup);
    cache.insert("memory:game-1:b", json!(2), EntryType::MemoryLookup);
    cache.insert("memory:game-2:a", json!(3), EntryType::MemoryLookup);
    cache.insert("response:game-1", json!(4), EntryType::Response);

    assert!(cache.invalidate("response:game-1"));
    assert!(!cache.invalidate("response:game-1"));
    assert_eq!(cache.invalidate_by_pattern("game-1"), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains("memory:game-2:a"));
}

#[test]
fn test_disabled_cache_is_noop() {
    let cache: ResultCache = ResultCache::new(CacheConfig::default().with_enabled(false));
    cache.insert("k", json!(1), EntryType::Response);
    assert!(cache.is_empty());
    assert_eq!(cache.get("k"), None);
}

#[tokio::test(start_paused = true)]
async fn test_stale_copy_outlives_primary() {
    let config = CacheConfig::default()
        .with_default_ttl_secs(60)
        .with_stale_ttl_secs(3_600);
    let cache: ResultCache = ResultCache::new(config);
    cache.put_with_stale_copy("k", json!("good"), EntryType::Response);

    tokio::time::advance(Duration::from_secs(120)).await;
    assert_eq!(cache.get("k"), None);
    assert_eq!(cache.get(&ensemble_cache::stale_key("k")), Some(json!("good")));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_and_sweeper_remove_unread_entries() {
    let config = CacheConfig::default()
        .with_default_ttl_secs(5)
        .with_sweep_interval_secs(60);
    let cache: Arc<ResultCache> = Arc::new(ResultCache::new(config));
    cache.insert("short", json!(1), EntryType::Computation);
    cache.put(
        "long",
        json!(2),
        EntryType::Computation,
        Some(Duration::from_secs(600)),
        Metadata::new(),
    );

    let sweeper = cache.spawn_sweeper();
    tokio::time::sleep(Duration::from_secs(61)).await;
    // Let the sweep task run after its tick.
    tokio::task::yield_now().await;

    assert_eq!(cache.len(), 1);
    assert!(cache.contains("long"));
    assert_eq!(cache.stats().expirations, 1);

    drop(sweeper);
    assert_eq!(cache.cleanup_expired(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_stops_when_cache_dropped() {
    let cache: Arc<ResultCache> = Arc::new(ResultCache::new(
        CacheConfig::default().with_sweep_interval_secs(1),
    ));
    let sweeper = cache.spawn_sweeper();
    drop(cache);

    tokio::time::sleep(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;
    assert!(sweeper.is_finished());
}

#[test]
fn test_config_from_toml() {
    let config: CacheConfig = toml::from_str(
        r#"
max_entries = 50
default_ttl_secs = 120

[type_ttls]
memory_lookup = 30
"#,
    )
    .unwrap();
    assert_eq!(*config.max_entries(), 50);
    assert_eq!(config.ttl_for(EntryType::MemoryLookup), Duration::from_secs(30));
    assert_eq!(*config.sweep_interval_secs(), 300);
    assert!(*config.enabled());
}
