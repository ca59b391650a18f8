//! Error types for rate limiting operations.

use ensemble_error::{CallError, CallErrorKind};
use std::fmt;
use std::time::Duration;

/// Error kinds for rate limiting operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RateLimitErrorKind {
    /// Capacity did not become available before the timeout.
    CapacityTimeout {
        /// Provider that was saturated
        provider: String,
        /// Time spent waiting
        waited: Duration,
    },
    /// More tokens were requested than the provider can ever hold.
    Unsatisfiable {
        /// Provider asked
        provider: String,
        /// Tokens requested
        requested: u32,
        /// Provider capacity (rounded down)
        capacity: u64,
    },
}

impl fmt::Display for RateLimitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitErrorKind::CapacityTimeout { provider, waited } => write!(
                f,
                "No capacity for provider '{}' after waiting {}ms",
                provider,
                waited.as_millis()
            ),
            RateLimitErrorKind::Unsatisfiable {
                provider,
                requested,
                capacity,
            } => write!(
                f,
                "Provider '{}' can never grant {} tokens (capacity {})",
                provider, requested, capacity
            ),
        }
    }
}

/// Rate limiting error with location tracking.
#[derive(Debug, Clone)]
pub struct RateLimitError {
    kind: RateLimitErrorKind,
    line: u32,
    file: &'static str,
}

impl RateLimitError {
    /// Create a new rate limiting error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RateLimitErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RateLimitErrorKind {
        &self.kind
    }

    /// Time spent waiting before the error was raised.
    pub fn waited(&self) -> Duration {
        match &self.kind {
            RateLimitErrorKind::CapacityTimeout { waited, .. } => *waited,
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rate Limit Error: {} at line {} in {}",
            self.kind, self.line, self.file
        )
    }
}

impl std::error::Error for RateLimitError {}

/// Saturation is transient; an impossible request is a configuration problem.
impl From<RateLimitError> for CallError {
    #[track_caller]
    fn from(err: RateLimitError) -> Self {
        let message = err.kind.to_string();
        match err.kind {
            RateLimitErrorKind::CapacityTimeout { .. } => CallError::new(CallErrorKind::RateLimited {
                message,
                retry_after: None,
            }),
            RateLimitErrorKind::Unsatisfiable { .. } => {
                CallError::new(CallErrorKind::Configuration(message))
            }
        }
    }
}
