//! Per-provider admission control, retry policy, and call management.
//!
//! - [`RateLimiter`] holds one admission controller per provider
//!   ([`TokenBucket`] or [`SlidingWindow`]) and admits calls against it.
//! - [`RetryPolicy`] computes backoff delays from a [`RetryConfig`] and
//!   decides retry eligibility from [`RetryableError`](ensemble_error::RetryableError).
//! - [`CallManager`] composes both around a single unit of work and keeps
//!   aggregate statistics.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod bucket;
mod budget;
mod error;
mod limiter;
mod manager;
mod retry;
mod window;

pub use admission::AdmissionControl;
pub use bucket::TokenBucket;
pub use budget::{ProviderLimitConfig, RateAlgorithm, RateBudget};
pub use error::{RateLimitError, RateLimitErrorKind};
pub use limiter::{MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, RateLimiter};
pub use manager::{CallAttemptResult, CallManager, CallStatsSnapshot};
pub use retry::{RetryConfig, RetryConfigBuilder, RetryPolicy, RetryStrategy};
pub use window::SlidingWindow;
