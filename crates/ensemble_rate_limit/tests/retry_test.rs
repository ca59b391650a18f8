//! Tests for backoff computation and retry eligibility.

use ensemble_error::{BuilderErrorKind, CallError, CallErrorKind};
use ensemble_rate_limit::{RetryConfig, RetryPolicy, RetryStrategy};
use std::time::Duration;

fn policy(strategy: RetryStrategy) -> RetryPolicy {
    RetryPolicy::new(
        RetryConfig::builder()
            .base_delay_ms(1_000)
            .max_delay_ms(10_000)
            .multiplier(2.0)
            .jitter(false)
            .strategy(strategy)
            .build()
            .unwrap(),
    )
}

#[test]
fn test_exponential_delays_are_clamped() {
    let policy = policy(RetryStrategy::Exponential);
    let delays: Vec<u64> = (1..=6)
        .map(|a| policy.compute_delay(a).as_millis() as u64)
        .collect();
    assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
}

#[test]
fn test_linear_and_fixed_delays() {
    let linear = policy(RetryStrategy::Linear);
    assert_eq!(linear.compute_delay(1), Duration::from_secs(1));
    assert_eq!(linear.compute_delay(3), Duration::from_secs(3));
    assert_eq!(linear.compute_delay(30), Duration::from_secs(10));

    let fixed = policy(RetryStrategy::Fixed);
    assert_eq!(fixed.compute_delay(1), Duration::from_secs(1));
    assert_eq!(fixed.compute_delay(7), Duration::from_secs(1));
}

#[test]
fn test_jitter_stays_within_ten_percent() {
    let policy = RetryPolicy::new(RetryConfig::builder().jitter(true).build().unwrap());
    for _ in 0..200 {
        let delay = policy.compute_delay(2).as_millis();
        assert!((1_800..=2_200).contains(&delay), "delay {} out of range", delay);
    }
}

#[test]
fn test_should_retry_respects_attempt_limit() {
    let policy = policy(RetryStrategy::Exponential);
    let transient = CallError::new(CallErrorKind::Timeout("read".into()));

    assert_eq!(policy.max_attempts(), 4);
    assert!(policy.should_retry(1, &transient));
    assert!(policy.should_retry(3, &transient));
    assert!(!policy.should_retry(4, &transient));
}

#[test]
fn test_permanent_errors_never_retry() {
    let policy = policy(RetryStrategy::Exponential);
    for kind in [
        CallErrorKind::Validation("bad".into()),
        CallErrorKind::Configuration("missing model".into()),
        CallErrorKind::Authentication("expired key".into()),
        CallErrorKind::Http {
            status: 400,
            message: "bad request".into(),
        },
    ] {
        assert!(!policy.should_retry(1, &CallError::new(kind)));
    }
}

#[test]
fn test_retry_after_raises_delay_up_to_max() {
    let policy = policy(RetryStrategy::Exponential);
    let short = CallError::new(CallErrorKind::RateLimited {
        message: "slow down".into(),
        retry_after: Some(Duration::from_secs(5)),
    });
    assert_eq!(policy.delay_for(1, &short), Duration::from_secs(5));

    let long = CallError::new(CallErrorKind::RateLimited {
        message: "come back tomorrow".into(),
        retry_after: Some(Duration::from_secs(86_400)),
    });
    assert_eq!(policy.delay_for(1, &long), Duration::from_secs(10));

    let none = CallError::new(CallErrorKind::Network("reset".into()));
    assert_eq!(policy.delay_for(3, &none), Duration::from_secs(4));
}

#[test]
fn test_config_validation() {
    let err = RetryConfig::builder()
        .base_delay_ms(5_000)
        .max_delay_ms(1_000)
        .build()
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        BuilderErrorKind::Rejected { target: "RetryConfig", reason } if reason.contains("max_delay_ms")
    ));
    assert!(RetryConfig::builder().multiplier(0.5).build().is_err());
    assert!(
        RetryConfig::builder()
            .multiplier(0.5)
            .strategy(RetryStrategy::Fixed)
            .build()
            .is_ok()
    );
    assert!(RetryConfig::builder().call_timeout_ms(0).build().is_err());
}

#[test]
fn test_config_from_toml_uses_defaults() {
    let config: RetryConfig = toml::from_str(
        r#"
max_retries = 5
strategy = "linear"
"#,
    )
    .unwrap();
    assert_eq!(*config.max_retries(), 5);
    assert_eq!(*config.strategy(), RetryStrategy::Linear);
    assert_eq!(config.base_delay(), Duration::from_secs(1));
    assert_eq!(config.max_delay(), Duration::from_secs(60));
    assert!(*config.jitter());
    assert!(config.call_timeout().is_none());
}
