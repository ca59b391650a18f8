//! Tests for the token bucket and sliding window admission controllers.

use ensemble_rate_limit::{
    AdmissionControl, ProviderLimitConfig, RateAlgorithm, RateBudget, SlidingWindow, TokenBucket,
};
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn test_five_immediate_calls_then_wait_one_second() {
    let now = Instant::now();
    let mut bucket = TokenBucket::starting_at(RateBudget::new(5.0, 1.0), now);

    for _ in 0..5 {
        assert!(bucket.try_acquire(1, now));
    }
    assert!(!bucket.try_acquire(1, now));
    assert_eq!(bucket.wait_time(1, now), Duration::from_secs(1));
}

#[test]
fn test_tokens_stay_within_bounds() {
    let start = Instant::now();
    let mut bucket = TokenBucket::starting_at(RateBudget::new(4.0, 2.5), start);
    let mut now = start;

    // Mixed bursts and pauses, including a long idle stretch.
    let steps: [(u64, u32); 12] = [
        (0, 3),
        (0, 3),
        (100, 1),
        (400, 2),
        (0, 4),
        (10_000, 1),
        (0, 4),
        (1, 1),
        (300, 2),
        (2_000, 3),
        (0, 5),
        (50, 1),
    ];
    for (advance_ms, n) in steps {
        now += Duration::from_millis(advance_ms);
        let before = bucket.available(now);
        let admitted = bucket.try_acquire(n, now);
        assert_eq!(admitted, before >= f64::from(n));
        assert!(bucket.tokens() >= 0.0, "tokens went negative");
        assert!(bucket.tokens() <= 4.0, "tokens exceeded capacity");
    }
}

#[test]
fn test_refill_restores_tokens() {
    let start = Instant::now();
    let mut bucket = TokenBucket::starting_at(RateBudget::new(2.0, 2.0), start);
    assert!(bucket.try_acquire(2, start));
    assert!(!bucket.try_acquire(1, start));

    let later = start + Duration::from_millis(500);
    assert!(bucket.try_acquire(1, later));
    assert!(!bucket.try_acquire(1, later));
}

#[test]
fn test_per_minute_budget() {
    let budget = RateBudget::per_minute(120, None);
    assert_eq!(budget.capacity, 120.0);
    assert_eq!(budget.refill_per_second, 2.0);

    let bursty = RateBudget::per_minute(60, Some(10));
    assert_eq!(bursty.capacity, 10.0);
    assert_eq!(bursty.refill_per_second, 1.0);
}

#[test]
fn test_sliding_window_admits_up_to_max() {
    let start = Instant::now();
    let mut window = SlidingWindow::new(3, Duration::from_secs(10));

    assert!(window.try_acquire(1, start));
    assert!(window.try_acquire(1, start + Duration::from_secs(1)));
    assert!(window.try_acquire(1, start + Duration::from_secs(2)));
    assert!(!window.try_acquire(1, start + Duration::from_secs(3)));

    // The first request ages out ten seconds after it was made.
    let probe = start + Duration::from_secs(3);
    assert_eq!(window.wait_time(1, probe), Duration::from_secs(7));
    assert!(window.try_acquire(1, start + Duration::from_secs(10)));
    assert_eq!(window.in_window(start + Duration::from_secs(10)), 3);
}

#[test]
fn test_provider_config_builds_requested_algorithm() {
    let config: ProviderLimitConfig = toml::from_str(
        r#"
requests_per_minute = 30
algorithm = "sliding_window"
window_secs = 10
"#,
    )
    .unwrap();
    assert_eq!(config.algorithm, RateAlgorithm::SlidingWindow);
    assert_eq!(config.window_requests(), 5);

    let control = config.build();
    assert_eq!(control.capacity(), 5.0);

    let default_config = ProviderLimitConfig::per_minute(60);
    assert_eq!(default_config.algorithm, RateAlgorithm::TokenBucket);
    assert_eq!(default_config.build().capacity(), 60.0);
}

#[test]
fn test_provider_config_validation() {
    assert!(ProviderLimitConfig::per_minute(0).validate("p").is_err());

    let mut config = ProviderLimitConfig::per_minute(10);
    config.burst_capacity = Some(0);
    assert!(config.validate("p").is_err());

    config.burst_capacity = Some(3);
    assert!(config.validate("p").is_ok());
}
