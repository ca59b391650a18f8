//! Provider identifier helpers.

/// Rate-limit domain of a provider or `provider/model` identifier.
///
/// # Examples
///
/// ```
/// use ensemble_core::provider_of;
///
/// assert_eq!(provider_of("openai/gpt-4o"), "openai");
/// assert_eq!(provider_of("anthropic"), "anthropic");
/// assert_eq!(provider_of("/orphan-model"), "/orphan-model");
/// ```
pub fn provider_of(id: &str) -> &str {
    match id.split_once('/') {
        Some((provider, _)) if !provider.trim().is_empty() => provider.trim(),
        _ => id,
    }
}
