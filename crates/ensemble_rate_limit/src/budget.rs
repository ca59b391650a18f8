//! Rate budgets and per-provider limit configuration.

use crate::{AdmissionControl, SlidingWindow, TokenBucket};
use ensemble_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable token-bucket parameters for one provider.
///
/// `capacity` is the ceiling the bucket refills to. `burst_capacity`, when
/// set, is how many tokens the bucket holds at start; it defaults to a
/// full bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBudget {
    /// Maximum tokens held.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_second: f64,
    /// Tokens available immediately after construction.
    #[serde(default)]
    pub burst_capacity: Option<f64>,
}

impl RateBudget {
    /// Budget starting with a full bucket.
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
            burst_capacity: None,
        }
    }

    /// Budget derived from a requests-per-minute quota.
    ///
    /// The bucket holds `burst` tokens (default: one minute's worth).
    pub fn per_minute(requests_per_minute: u32, burst: Option<u32>) -> Self {
        let capacity = burst.unwrap_or(requests_per_minute).max(1);
        Self::new(f64::from(capacity), f64::from(requests_per_minute) / 60.0)
    }

    /// Sets how many tokens are available at start.
    pub fn with_burst(mut self, burst: f64) -> Self {
        self.burst_capacity = Some(burst);
        self
    }

    /// Tokens at construction, always within `[0, capacity]`.
    pub fn initial_tokens(&self) -> f64 {
        self.burst_capacity
            .unwrap_or(self.capacity)
            .clamp(0.0, self.capacity.max(0.0))
    }
}

/// Admission algorithm for a provider.
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
pub enum RateAlgorithm {
    /// Lazily refilled token bucket.
    #[default]
    TokenBucket,
    /// Queue of request timestamps over a fixed window.
    SlidingWindow,
}

fn default_window_secs() -> u64 {
    60
}

/// Rate limits for one provider as written in configuration.
///
/// ```toml
/// [providers.openai]
/// requests_per_minute = 500
/// burst_capacity = 20
///
/// [providers.local]
/// requests_per_minute = 30
/// algorithm = "sliding_window"
/// window_secs = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLimitConfig {
    /// Sustained request rate.
    pub requests_per_minute: u32,

    /// Bucket size (token bucket) or window size override (sliding window).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_capacity: Option<u32>,

    /// Admission algorithm.
    #[serde(default)]
    pub algorithm: RateAlgorithm,

    /// Window span for the sliding-window algorithm.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl ProviderLimitConfig {
    /// Token-bucket limits from a per-minute quota.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_capacity: None,
            algorithm: RateAlgorithm::TokenBucket,
            window_secs: default_window_secs(),
        }
    }

    /// Validates the limits for the named provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the rate, burst, or window is zero.
    pub fn validate(&self, provider: &str) -> Result<(), ConfigError> {
        if self.requests_per_minute == 0 {
            return Err(ConfigError::new(format!(
                "providers.{}.requests_per_minute must be greater than 0",
                provider
            )));
        }
        if self.burst_capacity == Some(0) {
            return Err(ConfigError::new(format!(
                "providers.{}.burst_capacity must be greater than 0",
                provider
            )));
        }
        if self.algorithm == RateAlgorithm::SlidingWindow && self.window_secs == 0 {
            return Err(ConfigError::new(format!(
                "providers.{}.window_secs must be greater than 0",
                provider
            )));
        }
        Ok(())
    }

    /// Token-bucket budget implied by these limits.
    pub fn budget(&self) -> RateBudget {
        RateBudget::per_minute(self.requests_per_minute, self.burst_capacity)
    }

    /// Requests admitted per sliding window.
    pub fn window_requests(&self) -> usize {
        let scaled = u64::from(self.requests_per_minute) * self.window_secs / 60;
        self.burst_capacity
            .map(u64::from)
            .unwrap_or(scaled)
            .max(1) as usize
    }

    /// Builds the configured admission controller.
    pub fn build(&self) -> Box<dyn AdmissionControl> {
        match self.algorithm {
            RateAlgorithm::TokenBucket => Box::new(TokenBucket::new(self.budget())),
            RateAlgorithm::SlidingWindow => Box::new(SlidingWindow::new(
                self.window_requests(),
                Duration::from_secs(self.window_secs),
            )),
        }
    }
}
