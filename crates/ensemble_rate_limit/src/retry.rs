//! Backoff computation and retry eligibility.

use ensemble_error::{BuilderError, ConfigError, RetryableError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryStrategy {
    /// `base * multiplier^(attempt - 1)`
    #[default]
    Exponential,
    /// `base * attempt`
    Linear,
    /// `base`
    Fixed,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Retry settings for calls to one provider.
///
/// ```toml
/// [retry]
/// max_retries = 3
/// base_delay_ms = 1000
/// max_delay_ms = 60000
/// multiplier = 2.0
/// jitter = true
/// strategy = "exponential"
/// call_timeout_ms = 30000
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_builder::Builder,
    derive_getters::Getters,
)]
#[builder(
    default,
    build_fn(private, name = "build_internal", validate = "Self::validate")
)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    base_delay_ms: u64,
    /// Ceiling for any single delay.
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
    /// Growth factor for exponential backoff.
    #[serde(default = "default_multiplier")]
    multiplier: f64,
    /// Perturb delays by up to ±10%.
    #[serde(default = "default_jitter")]
    jitter: bool,
    /// Delay growth strategy.
    #[serde(default)]
    strategy: RetryStrategy,
    /// Per-attempt timeout; elapse counts as a retryable timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    call_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            strategy: RetryStrategy::default(),
            call_timeout_ms: None,
        }
    }
}

impl RetryConfig {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Ceiling for any single delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Per-attempt timeout.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_delay_ms < base_delay_ms`, if an exponential
    /// multiplier is below 1, or if the call timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check(self).map_err(|reason| ConfigError::new(format!("retry: {}", reason)))
    }
}

fn check(config: &RetryConfig) -> Result<(), String> {
    if config.max_delay_ms < config.base_delay_ms {
        return Err(format!(
            "max_delay_ms ({}) must be at least base_delay_ms ({})",
            config.max_delay_ms, config.base_delay_ms
        ));
    }
    if config.strategy == RetryStrategy::Exponential
        && !(config.multiplier.is_finite() && config.multiplier >= 1.0)
    {
        return Err(format!(
            "multiplier must be >= 1.0 for exponential backoff, got {}",
            config.multiplier
        ));
    }
    if config.call_timeout_ms == Some(0) {
        return Err("call_timeout_ms must be greater than 0".to_string());
    }
    Ok(())
}

impl RetryConfigBuilder {
    /// Build the RetryConfig.
    ///
    /// # Errors
    ///
    /// Returns error if the resulting settings are inconsistent.
    pub fn build(&self) -> Result<RetryConfig, BuilderError> {
        self.build_internal().map_err(|e| match e {
            RetryConfigBuilderError::UninitializedField(field) => {
                BuilderError::missing("RetryConfig", field)
            }
            RetryConfigBuilderError::ValidationError(reason) => {
                BuilderError::rejected("RetryConfig", reason)
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        let defaults = RetryConfig::default();
        let candidate = RetryConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            base_delay_ms: self.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(defaults.max_delay_ms),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
            strategy: self.strategy.unwrap_or(defaults.strategy),
            call_timeout_ms: self.call_timeout_ms.unwrap_or(defaults.call_timeout_ms),
        };
        check(&candidate)
    }
}

/// Jitter bound as a fraction of the delay.
const JITTER_FRACTION: f64 = 0.1;

/// Computes backoff delays and decides whether to retry.
///
/// Attempts are numbered from 1. A call makes at most
/// `max_retries + 1` attempts.
///
/// # Example
///
/// ```
/// use ensemble_rate_limit::{RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let config = RetryConfig::builder().jitter(false).build().unwrap();
/// let policy = RetryPolicy::new(config);
///
/// assert_eq!(policy.compute_delay(1), Duration::from_secs(1));
/// assert_eq!(policy.compute_delay(2), Duration::from_secs(2));
/// assert_eq!(policy.compute_delay(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Underlying configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Upper bound on attempts for one logical call.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.saturating_add(1)
    }

    /// Delay after `attempt` before jitter, clamped to `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.config.base_delay_ms as f64;
        let millis = match self.config.strategy {
            RetryStrategy::Exponential => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                base * self.config.multiplier.powi(exponent)
            }
            RetryStrategy::Linear => base * f64::from(attempt),
            RetryStrategy::Fixed => base,
        };
        let capped = millis.min(self.config.max_delay_ms as f64).max(0.0);
        Duration::from_secs_f64(capped / 1_000.0)
    }

    /// Delay after `attempt`, with jitter applied when enabled.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay(attempt);
        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
        delay.mul_f64(factor)
    }

    /// Delay after `attempt` failed with `error`.
    ///
    /// A server-provided `retry_after` raises the delay, still bounded by
    /// `max_delay`.
    pub fn delay_for<E: RetryableError>(&self, attempt: u32, error: &E) -> Duration {
        let delay = self.compute_delay(attempt);
        match error.retry_after() {
            Some(requested) => delay.max(requested.min(self.config.max_delay())),
            None => delay,
        }
    }

    /// Whether a failure on `attempt` should be retried.
    pub fn should_retry<E: RetryableError>(&self, attempt: u32, error: &E) -> bool {
        attempt <= self.config.max_retries && error.is_retryable()
    }
}
