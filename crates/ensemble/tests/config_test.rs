//! Tests for layered configuration loading and validation.

use ensemble::{CategoryPriority, EnsembleConfig, RateAlgorithm};
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_bundled_config_is_valid() {
    let config = EnsembleConfig::bundled().unwrap();
    config.validate_for_run().unwrap();

    assert_eq!(config.providers().len(), 3);
    assert_eq!(
        config.providers()["gemini"].algorithm,
        RateAlgorithm::SlidingWindow
    );
    assert_eq!(config.dispatch().max_concurrent_per_provider(), &3);
    assert_eq!(
        config.categories()["winner"].priority,
        CategoryPriority::Critical
    );
    assert_eq!(
        config.categories()["spread"].depends_on,
        vec!["winner".to_string()]
    );
}

#[test]
fn test_from_file_fills_defaults() {
    let file = write_config(
        r#"
[dispatch]
max_concurrent_tasks = 4

[providers.local]
requests_per_minute = 30
burst_capacity = 5
"#,
    );

    let config = EnsembleConfig::from_file(file.path()).unwrap();
    assert_eq!(config.dispatch().max_concurrent_tasks(), &4);
    assert_eq!(config.dispatch().max_concurrent_per_provider(), &3);
    assert_eq!(config.providers()["local"].burst_capacity, Some(5));
    assert_eq!(config.retry().max_retries(), &3);
    assert!(config.categories().is_empty());
    config.validate_for_run().unwrap();
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(EnsembleConfig::from_file("/nonexistent/ensemble.toml").is_err());
}

#[test]
fn test_load_includes_bundled_defaults() {
    let config = EnsembleConfig::load().unwrap();
    assert!(!config.providers().is_empty());
}

#[test]
fn test_no_providers_fails_only_for_runs() {
    let config = EnsembleConfig::default();
    assert!(config.validate().is_ok());

    let err = config.validate_for_run().unwrap_err();
    assert!(err.message.contains("no providers"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let zero_rate = EnsembleConfig::from_toml_str(
        r#"
[providers.openai]
requests_per_minute = 0
"#,
    )
    .unwrap();
    assert!(zero_rate.validate().is_err());

    let bad_retry = EnsembleConfig::from_toml_str(
        r#"
[retry]
base_delay_ms = 5000
max_delay_ms = 1000
"#,
    )
    .unwrap();
    assert!(bad_retry.validate().is_err());

    let zero_cache = EnsembleConfig::from_toml_str(
        r#"
[cache]
max_entries = 0
"#,
    )
    .unwrap();
    assert!(zero_cache.validate().is_err());

    let zero_cap = EnsembleConfig::from_toml_str(
        r#"
[dispatch]
max_concurrent_per_provider = 0
"#,
    )
    .unwrap();
    assert!(zero_cap.validate().is_err());
}

#[test]
fn test_unknown_category_dependency_is_rejected() {
    let config = EnsembleConfig::from_toml_str(
        r#"
[categories.spread]
priority = "high"
depends_on = ["winner"]
"#,
    )
    .unwrap();

    let err = config.validate().unwrap_err();
    assert!(err.message.contains("unknown category 'winner'"));
}
