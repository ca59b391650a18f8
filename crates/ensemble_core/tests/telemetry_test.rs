//! Tests for the default tracing filter.

use ensemble_core::DEFAULT_FILTER;
use tracing_subscriber::EnvFilter;

#[test]
fn test_default_filter_parses() {
    assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
}

#[test]
fn test_default_filter_enables_debug_for_every_crate() {
    let directives: Vec<&str> = DEFAULT_FILTER.split(',').collect();
    assert_eq!(directives[0], "info");

    for target in [
        "ensemble",
        "ensemble_error",
        "ensemble_core",
        "ensemble_rate_limit",
        "ensemble_cache",
        "ensemble_recovery",
        "ensemble_dispatch",
    ] {
        let directive = format!("{}=debug", target);
        assert!(
            directives.contains(&directive.as_str()),
            "missing directive for {}",
            target
        );
    }
}
