//! Errors returned by task operations and the retry machinery.

use crate::ErrorCategory;
use std::time::Duration;

/// Specific failure conditions of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CallErrorKind {
    /// Provider throttled the request
    #[display("Rate limited: {}", message)]
    RateLimited {
        /// Provider message
        message: String,
        /// Server-suggested wait before the next attempt
        retry_after: Option<Duration>,
    },
    /// Call did not complete in time
    #[display("Request timed out: {}", _0)]
    Timeout(String),
    /// Transport-level failure
    #[display("Network failure: {}", _0)]
    Network(String),
    /// HTTP error with status code and message
    #[display("HTTP {} error: {}", status, message)]
    Http {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// Provider accepted the request but produced nothing usable
    #[display("Upstream generation failed: {}", _0)]
    Generation(String),
    /// Response could not be parsed
    #[display("Failed to parse response: {}", _0)]
    Parse(String),
    /// Request rejected as invalid
    #[display("Validation failed: {}", _0)]
    Validation(String),
    /// Caller or provider misconfiguration
    #[display("Configuration invalid: {}", _0)]
    Configuration(String),
    /// Credentials rejected
    #[display("Authentication failed: {}", _0)]
    Authentication(String),
    /// Backing store unreachable
    #[display("Database unavailable: {}", _0)]
    Database(String),
    /// Dispatcher-level task deadline elapsed
    #[display("Task deadline of {}ms exceeded", _0)]
    DeadlineExceeded(u64),
    /// Task body panicked or was cancelled
    #[display("Task aborted: {}", _0)]
    Aborted(String),
    /// Opaque error from external code, classified by its text
    #[display("{}", _0)]
    Other(String),
}

impl CallErrorKind {
    /// Category of this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CallErrorKind::RateLimited { .. } => ErrorCategory::RateLimited,
            CallErrorKind::Timeout(_)
            | CallErrorKind::Network(_)
            | CallErrorKind::DeadlineExceeded(_) => ErrorCategory::NetworkTimeout,
            CallErrorKind::Http { status, .. } => ErrorCategory::from_status(*status),
            CallErrorKind::Generation(_) => ErrorCategory::UpstreamGenerationFailure,
            CallErrorKind::Parse(_) => ErrorCategory::ResponseParseFailure,
            CallErrorKind::Validation(_) => ErrorCategory::Validation,
            CallErrorKind::Configuration(_) | CallErrorKind::Authentication(_) => {
                ErrorCategory::Configuration
            }
            CallErrorKind::Database(_) => ErrorCategory::DatabaseUnavailable,
            CallErrorKind::Aborted(_) => ErrorCategory::Unknown,
            CallErrorKind::Other(message) => ErrorCategory::from_message(message),
        }
    }

    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallErrorKind::DeadlineExceeded(_) | CallErrorKind::Aborted(_) => false,
            CallErrorKind::Http { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            other => other.category().is_transient(),
        }
    }
}

/// Call error with source location tracking.
///
/// # Examples
///
/// ```
/// use ensemble_error::{CallError, CallErrorKind, ErrorCategory, RetryableError};
///
/// let err = CallError::new(CallErrorKind::Http {
///     status: 503,
///     message: "Service unavailable".to_string(),
/// });
/// assert!(err.is_retryable());
/// assert_eq!(err.category(), ErrorCategory::UpstreamGenerationFailure);
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Call Error: {} at line {} in {}", kind, line, file)]
pub struct CallError {
    /// The kind of error that occurred
    pub kind: CallErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CallError {
    /// Create a new CallError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CallErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Opaque error classified later from its text.
    #[track_caller]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Other(message.into()))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CallErrorKind {
        &self.kind
    }

    /// Category of the underlying kind.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl From<CallErrorKind> for CallError {
    #[track_caller]
    fn from(kind: CallErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Trait for errors that support retry logic.
///
/// Transient errors like 503 (service unavailable), 429 (rate limit),
/// or network timeouts return true. Permanent errors like 401
/// (unauthorized) or 400 (bad request) return false.
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    fn is_retryable(&self) -> bool;

    /// Minimum wait the provider asked for before the next attempt.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryableError for CallError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            CallErrorKind::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
