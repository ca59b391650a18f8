//! Rate-limited, retrying execution of a single logical call.

use crate::{RateLimitErrorKind, RateLimiter, RetryConfig, RetryPolicy};
use ensemble_core::provider_of;
use ensemble_error::{CallError, CallErrorKind, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Outcome of one logical call after all internal retries.
#[derive(Debug)]
pub struct CallAttemptResult<T> {
    /// Value of the successful attempt, or the last error.
    pub result: Result<T, CallError>,
    /// Attempts made, between 1 and `max_retries + 1`.
    pub attempts: u32,
    /// Time spent waiting for capacity and backing off.
    pub total_delay: Duration,
    /// Whether any attempt waited on, or was rejected by, a rate limit.
    pub rate_limited: bool,
}

impl<T> CallAttemptResult<T> {
    /// Whether the call eventually succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Whether more than one attempt was made.
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }

    /// Error of the final attempt, if it failed.
    pub fn error(&self) -> Option<&CallError> {
        self.result.as_ref().err()
    }

    /// Consume into the underlying result.
    pub fn into_result(self) -> Result<T, CallError> {
        self.result
    }
}

/// Aggregate call counters.
#[derive(Debug, Default)]
struct CallStats {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rate_limited: AtomicU64,
    retried_calls: AtomicU64,
    total_retries: AtomicU64,
    total_delay_ms: AtomicU64,
}

/// Point-in-time copy of the call counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CallStatsSnapshot {
    /// Logical calls completed.
    pub total: u64,
    /// Calls that eventually succeeded.
    pub succeeded: u64,
    /// Calls that failed after all attempts.
    pub failed: u64,
    /// Calls that hit a rate limit at least once.
    pub rate_limited: u64,
    /// Calls needing more than one attempt.
    pub retried_calls: u64,
    /// Retries across all calls.
    pub total_retries: u64,
    /// Delay across all calls in milliseconds.
    pub total_delay_ms: u64,
}

impl CallStatsSnapshot {
    /// Mean retries per completed call.
    pub fn average_retries_per_call(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_retries as f64 / self.total as f64
        }
    }

    /// Fraction of calls that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Composes the rate limiter and retry policy around a unit of work.
///
/// # Example
///
/// ```
/// use ensemble_error::{CallError, CallErrorKind};
/// use ensemble_rate_limit::{CallManager, RateLimiter, RetryConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let manager = CallManager::new(Arc::new(RateLimiter::new()));
/// let config = RetryConfig::default();
///
/// let outcome = manager
///     .execute("openai/gpt-4o", &config, || async {
///         Err::<(), _>(CallError::new(CallErrorKind::Validation("bad prompt".into())))
///     })
///     .await;
///
/// assert!(!outcome.is_success());
/// assert_eq!(outcome.attempts, 1);
/// # }
/// ```
#[derive(Debug)]
pub struct CallManager {
    limiter: Arc<RateLimiter>,
    capacity_timeout: Option<Duration>,
    stats: CallStats,
}

impl CallManager {
    /// Create a manager over a shared limiter.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            capacity_timeout: None,
            stats: CallStats::default(),
        }
    }

    /// Bound each wait for rate-limit capacity.
    ///
    /// A wait that times out counts as a rate-limited failure of that
    /// attempt and is retried like any other.
    pub fn with_capacity_timeout(mut self, timeout: Duration) -> Self {
        self.capacity_timeout = Some(timeout);
        self
    }

    /// Shared limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Snapshot of the aggregate counters.
    pub fn stats(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            total: self.stats.total.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            rate_limited: self.stats.rate_limited.load(Ordering::Relaxed),
            retried_calls: self.stats.retried_calls.load(Ordering::Relaxed),
            total_retries: self.stats.total_retries.load(Ordering::Relaxed),
            total_delay_ms: self.stats.total_delay_ms.load(Ordering::Relaxed),
        }
    }

    /// Run `op` under the provider's rate limit, retrying per `config`.
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        config: &RetryConfig,
        op: F,
    ) -> CallAttemptResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        self.execute_within(provider, config, None, op).await
    }

    /// Like [`execute`](Self::execute), bounded by an overall budget.
    ///
    /// Once `budget` has elapsed, no further attempt is started, an
    /// in-flight attempt is cancelled, and the call fails with
    /// [`CallErrorKind::DeadlineExceeded`].
    #[instrument(
        skip(self, config, op),
        fields(provider = provider_of(provider), max_retries = *config.max_retries())
    )]
    pub async fn execute_within<T, F, Fut>(
        &self,
        provider: &str,
        config: &RetryConfig,
        budget: Option<Duration>,
        mut op: F,
    ) -> CallAttemptResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let policy = RetryPolicy::new(config.clone());
        let deadline = budget.map(|b| (Instant::now() + b, b));
        let mut total_delay = Duration::ZERO;
        let mut rate_limited = false;
        let mut attempt = 1;

        let result = loop {
            let outcome = match self.acquire(provider, deadline).await {
                Ok(waited) => {
                    if !waited.is_zero() {
                        rate_limited = true;
                        total_delay += waited;
                    }
                    invoke(&mut op, config.call_timeout(), deadline).await
                }
                Err((waited, err)) => {
                    rate_limited = true;
                    total_delay += waited;
                    Err(err)
                }
            };

            let err = match outcome {
                Ok(value) => {
                    debug!(attempt, "Call succeeded");
                    break Ok(value);
                }
                Err(err) => err,
            };

            if err.category() == ErrorCategory::RateLimited {
                rate_limited = true;
            }

            let deadline_hit = matches!(err.kind, CallErrorKind::DeadlineExceeded(_));
            if deadline_hit || !policy.should_retry(attempt, &err) {
                warn!(attempt, error = %err.kind, "Call failed, not retrying");
                break Err(err);
            }

            let delay = policy.delay_for(attempt, &err);
            if let Some((at, budget)) = deadline
                && Instant::now() + delay >= at
            {
                warn!(attempt, error = %err.kind, "Backoff would pass the deadline");
                break Err(deadline_error(budget));
            }

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err.kind,
                "Transient error, will retry"
            );
            tokio::time::sleep(delay).await;
            total_delay += delay;
            attempt += 1;
        };

        let outcome = CallAttemptResult {
            result,
            attempts: attempt,
            total_delay,
            rate_limited,
        };
        self.record(&outcome);
        outcome
    }

    async fn acquire(
        &self,
        provider: &str,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<Duration, (Duration, CallError)> {
        let remaining = deadline.map(|(at, _)| at.saturating_duration_since(Instant::now()));
        let timeout = match (self.capacity_timeout, remaining) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match self.limiter.await_capacity(provider, 1, timeout).await {
            Ok(waited) => Ok(waited),
            Err(err) => {
                let waited = err.waited();
                let deadline_binds = matches!(err.kind(), RateLimitErrorKind::CapacityTimeout { .. })
                    && remaining.is_some()
                    && remaining == timeout;
                match deadline {
                    Some((_, budget)) if deadline_binds => Err((waited, deadline_error(budget))),
                    _ => Err((waited, CallError::from(err))),
                }
            }
        }
    }

    fn record<T>(&self, outcome: &CallAttemptResult<T>) {
        let retries = u64::from(outcome.attempts.saturating_sub(1));
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        if outcome.is_success() {
            self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.rate_limited {
            self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
        if retries > 0 {
            self.stats.retried_calls.fetch_add(1, Ordering::Relaxed);
            self.stats.total_retries.fetch_add(retries, Ordering::Relaxed);
        }
        self.stats
            .total_delay_ms
            .fetch_add(outcome.total_delay.as_millis() as u64, Ordering::Relaxed);
    }
}

#[track_caller]
fn deadline_error(budget: Duration) -> CallError {
    CallError::new(CallErrorKind::DeadlineExceeded(budget.as_millis() as u64))
}

/// Run one attempt, bounded by the call timeout and the overall deadline.
async fn invoke<T, F, Fut>(
    op: &mut F,
    call_timeout: Option<Duration>,
    deadline: Option<(Instant, Duration)>,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let remaining = deadline.map(|(at, _)| at.saturating_duration_since(Instant::now()));
    if let (Some(remaining), Some((_, budget))) = (remaining, deadline)
        && remaining.is_zero()
    {
        return Err(deadline_error(budget));
    }

    let limit = match (call_timeout, remaining) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    let Some(limit) = limit else {
        return op().await;
    };

    match tokio::time::timeout(limit, op()).await {
        Ok(result) => result,
        Err(_) => match deadline {
            Some((_, budget)) if remaining == Some(limit) => Err(deadline_error(budget)),
            _ => Err(CallError::new(CallErrorKind::Timeout(format!(
                "call exceeded {}ms",
                limit.as_millis()
            )))),
        },
    }
}
