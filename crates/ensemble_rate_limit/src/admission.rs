//! Admission control trait shared by the limiter algorithms.

use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

/// Per-provider admission control.
///
/// Implementations are plain state machines driven by an explicit clock
/// reading so they can be tested deterministically. The [`RateLimiter`]
/// wraps each one in a mutex and supplies `now`.
///
/// [`RateLimiter`]: crate::RateLimiter
///
/// # Example
///
/// ```
/// use ensemble_rate_limit::{AdmissionControl, RateBudget, TokenBucket};
/// use tokio::time::Instant;
///
/// let mut bucket = TokenBucket::new(RateBudget::new(2.0, 1.0));
/// let now = Instant::now();
/// assert!(bucket.try_acquire(2, now));
/// assert!(!bucket.try_acquire(1, now));
/// ```
pub trait AdmissionControl: Debug + Send {
    /// Consume `n` permits if available at `now`.
    fn try_acquire(&mut self, n: u32, now: Instant) -> bool;

    /// Time until `n` permits would be available, zero if available now.
    fn wait_time(&mut self, n: u32, now: Instant) -> Duration;

    /// Permits currently available.
    fn available(&mut self, now: Instant) -> f64;

    /// Largest number of permits that can ever be granted at once.
    fn capacity(&self) -> f64;
}
