//! Process-wide per-provider rate limiter.
//!
//! One [`RateLimiter`] is constructed at startup and shared by reference
//! with every component that calls providers. Each provider owns one
//! admission controller guarded by its own mutex, so providers never
//! contend with each other and no lock is held across an `.await`.

use crate::{AdmissionControl, ProviderLimitConfig, RateBudget, RateLimitError, RateLimitErrorKind, TokenBucket};
use ensemble_core::provider_of;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Shortest sleep between capacity checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest sleep between capacity checks.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

type SharedControl = Arc<Mutex<Box<dyn AdmissionControl>>>;

fn lock(control: &SharedControl) -> MutexGuard<'_, Box<dyn AdmissionControl>> {
    control.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate limiter keyed by provider id.
///
/// Provider ids of the form `"provider/model"` share the budget of
/// `"provider"`. Providers that were never registered are always allowed.
///
/// # Example
///
/// ```
/// use ensemble_rate_limit::{RateBudget, RateLimiter};
///
/// let limiter = RateLimiter::new();
/// limiter.register_budget("p1", RateBudget::new(5.0, 1.0));
///
/// for _ in 0..5 {
///     assert!(limiter.can_consume("p1/model-a", 1));
/// }
/// assert!(!limiter.can_consume("p1", 1));
/// assert!(limiter.can_consume("unconfigured", 1));
/// ```
#[derive(Debug, Default)]
pub struct RateLimiter {
    controls: RwLock<HashMap<String, SharedControl>>,
}

impl RateLimiter {
    /// Create a limiter with no providers configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a limiter from per-provider configuration.
    pub fn from_configs<'a, I>(configs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a ProviderLimitConfig)>,
    {
        let limiter = Self::new();
        for (provider, config) in configs {
            limiter.register(provider.as_str(), config);
        }
        limiter
    }

    /// Register or replace a provider's limits.
    pub fn register(&self, provider: &str, config: &ProviderLimitConfig) {
        debug!(
            provider,
            rpm = config.requests_per_minute,
            algorithm = %config.algorithm,
            "Registering provider rate limit"
        );
        self.register_control(provider, config.build());
    }

    /// Register or replace a provider's token-bucket budget.
    pub fn register_budget(&self, provider: &str, budget: RateBudget) {
        self.register_control(provider, Box::new(TokenBucket::new(budget)));
    }

    /// Register any admission controller for a provider.
    pub fn register_control(&self, provider: &str, control: Box<dyn AdmissionControl>) {
        let mut controls = self
            .controls
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        controls.insert(provider_of(provider).to_string(), Arc::new(Mutex::new(control)));
    }

    /// Whether the provider has limits configured.
    pub fn is_configured(&self, provider: &str) -> bool {
        self.control(provider).is_some()
    }

    /// Configured provider ids, sorted.
    pub fn providers(&self) -> Vec<String> {
        let controls = self.controls.read().unwrap_or_else(PoisonError::into_inner);
        let mut providers: Vec<String> = controls.keys().cloned().collect();
        providers.sort();
        providers
    }

    fn control(&self, provider: &str) -> Option<SharedControl> {
        let controls = self.controls.read().unwrap_or_else(PoisonError::into_inner);
        controls.get(provider_of(provider)).cloned()
    }

    /// Consume `n` permits if they are available right now.
    pub fn can_consume(&self, provider: &str, n: u32) -> bool {
        match self.control(provider) {
            Some(control) => lock(&control).try_acquire(n, Instant::now()),
            None => true,
        }
    }

    /// Time until `n` permits would be available; zero when available now.
    ///
    /// Returns [`Duration::MAX`] when the provider can never grant `n`.
    pub fn wait_time(&self, provider: &str, n: u32) -> Duration {
        match self.control(provider) {
            Some(control) => lock(&control).wait_time(n, Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Permits available right now, `None` for unconfigured providers.
    pub fn available(&self, provider: &str) -> Option<f64> {
        self.control(provider)
            .map(|control| lock(&control).available(Instant::now()))
    }

    /// Wait until `n` permits are consumed for the provider.
    ///
    /// Returns the time spent waiting. Sleeps for the computed wait time,
    /// clamped to [`MIN_POLL_INTERVAL`]..=[`MAX_POLL_INTERVAL`], then
    /// re-checks, since concurrent callers may take the refilled tokens.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitErrorKind::CapacityTimeout`] when `timeout`
    /// elapses first, or [`RateLimitErrorKind::Unsatisfiable`] when `n`
    /// exceeds what the provider can ever hold.
    #[instrument(skip(self), fields(provider = provider_of(provider)))]
    pub async fn await_capacity(
        &self,
        provider: &str,
        n: u32,
        timeout: Option<Duration>,
    ) -> Result<Duration, RateLimitError> {
        let Some(control) = self.control(provider) else {
            return Ok(Duration::ZERO);
        };

        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);

        loop {
            let now = Instant::now();
            let wait = {
                let mut guard = lock(&control);
                if guard.try_acquire(n, now) {
                    let waited = now.saturating_duration_since(start);
                    if !waited.is_zero() {
                        debug!(waited_ms = waited.as_millis() as u64, "Capacity acquired after wait");
                    }
                    return Ok(waited);
                }
                if f64::from(n) > guard.capacity() {
                    return Err(RateLimitError::new(RateLimitErrorKind::Unsatisfiable {
                        provider: provider_of(provider).to_string(),
                        requested: n,
                        capacity: guard.capacity().floor() as u64,
                    }));
                }
                guard.wait_time(n, now)
            };

            let mut sleep_for = wait.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(now);
                if remaining.is_zero() {
                    let waited = now.saturating_duration_since(start);
                    warn!(waited_ms = waited.as_millis() as u64, "Timed out waiting for capacity");
                    return Err(RateLimitError::new(RateLimitErrorKind::CapacityTimeout {
                        provider: provider_of(provider).to_string(),
                        waited,
                    }));
                }
                sleep_for = sleep_for.min(remaining);
            }

            debug!(sleep_ms = sleep_for.as_millis() as u64, "Waiting for capacity");
            tokio::time::sleep(sleep_for).await;
        }
    }
}
