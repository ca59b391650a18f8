//! Deterministic cache-key derivation.

use crate::{CacheError, CacheErrorKind, CacheResult};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Separator between hashed parts so `["ab", "c"]` and `["a", "bc"]` differ.
const PART_SEPARATOR: u8 = 0x1f;

/// Suffix of the long-lived copy kept for cached fallbacks.
const STALE_SUFFIX: &str = "#stale";

/// Key derived from a namespace and every input that affects the result.
///
/// The namespace stays readable so related keys can be invalidated by
/// pattern; the inputs are hashed with SHA-256.
///
/// # Example
///
/// ```
/// use ensemble_cache::cache_key;
///
/// let a = cache_key("memory", &["game-7", "statistician"]);
/// let b = cache_key("memory", &["game-7", "statistician"]);
/// let c = cache_key("memory", &["game-7", "contrarian"]);
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// assert!(a.starts_with("memory:"));
/// ```
pub fn cache_key<S: AsRef<str>>(namespace: &str, parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update([PART_SEPARATOR]);
    }
    format!("{}:{:x}", namespace, hasher.finalize())
}

/// Key derived from a serializable description of the inputs.
///
/// Object fields are hashed in sorted order, so field order in the
/// source value does not matter.
///
/// # Errors
///
/// Returns an error if `inputs` cannot be serialized to JSON.
pub fn cache_key_json<T: Serialize>(namespace: &str, inputs: &T) -> CacheResult<String> {
    let value = serde_json::to_value(inputs)
        .map_err(|e| CacheError::new(CacheErrorKind::KeySerialization(e.to_string())))?;
    let canonical = serde_json::to_string(&value)
        .map_err(|e| CacheError::new(CacheErrorKind::KeySerialization(e.to_string())))?;
    Ok(cache_key(namespace, &[canonical]))
}

/// Key of the long-lived copy of `key`.
pub fn stale_key(key: &str) -> String {
    format!("{}{}", key, STALE_SUFFIX)
}
