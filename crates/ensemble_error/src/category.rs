//! Coarse failure categories shared by retry, fallback, and reporting.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Category of a failed call.
///
/// Categories drive retry eligibility, severity escalation, and which
/// fallback strategies may substitute a value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Provider throttled the request (429, quota).
    RateLimited,
    /// Timeout, connection reset, DNS or other transport failure.
    NetworkTimeout,
    /// Backing database could not be reached.
    DatabaseUnavailable,
    /// Upstream provider failed to produce a result (5xx, overload).
    UpstreamGenerationFailure,
    /// Response arrived but could not be parsed.
    ResponseParseFailure,
    /// Request was rejected as invalid.
    Validation,
    /// Misconfiguration or failed authentication.
    Configuration,
    /// Nothing matched.
    Unknown,
}

/// Keyword table for free-text classification, checked in order.
///
/// Parse keywords precede the upstream ones so a parse failure that quotes
/// an offset or payload never reads as a server error.
const MESSAGE_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::RateLimited,
        &["rate limit", "ratelimit", "rate-limit", "too many requests", "quota"],
    ),
    (
        ErrorCategory::NetworkTimeout,
        &[
            "timeout",
            "timed out",
            "connection reset",
            "connection refused",
            "connection closed",
            "broken pipe",
            "network",
            "dns",
        ],
    ),
    (
        ErrorCategory::DatabaseUnavailable,
        &["database", "sqlite", "postgres", "connection pool", "db unavailable"],
    ),
    (
        ErrorCategory::Configuration,
        &[
            "configuration",
            "config",
            "api key",
            "unauthorized",
            "forbidden",
            "authentication",
            "permission denied",
        ],
    ),
    (
        ErrorCategory::Validation,
        &["validation", "invalid input", "invalid argument", "unprocessable"],
    ),
    (
        ErrorCategory::ResponseParseFailure,
        &["parse", "json", "deserialize", "malformed", "unexpected token"],
    ),
    (
        ErrorCategory::UpstreamGenerationFailure,
        &[
            "internal server error",
            "bad gateway",
            "service unavailable",
            "unavailable",
            "overloaded",
            "server error",
            "generation failed",
        ],
    ),
];

/// Standalone three-digit HTTP status, e.g. `HTTP 503` or `status=429`.
static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([1-5]\d{2})\b").expect("Valid status code regex"));

impl ErrorCategory {
    /// Classify free text against the built-in keyword table.
    ///
    /// Keywords are matched case-insensitively first; failing those, the
    /// first standalone HTTP status code decides. Structured error kinds should be
    /// preferred; this exists for opaque messages from external code.
    ///
    /// # Examples
    ///
    /// ```
    /// use ensemble_error::ErrorCategory;
    ///
    /// assert_eq!(ErrorCategory::from_message("HTTP 429 Too Many Requests"), ErrorCategory::RateLimited);
    /// assert_eq!(ErrorCategory::from_message("connection reset by peer"), ErrorCategory::NetworkTimeout);
    /// assert_eq!(ErrorCategory::from_message("mystery"), ErrorCategory::Unknown);
    /// ```
    pub fn from_message(message: &str) -> Self {
        let lowered = message.to_lowercase();
        MESSAGE_PATTERNS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lowered.contains(n)))
            .map(|(category, _)| *category)
            .or_else(|| {
                STATUS_CODE
                    .captures_iter(&lowered)
                    .filter_map(|caps| caps[1].parse::<u16>().ok())
                    .map(Self::from_status)
                    .find(|category| *category != ErrorCategory::Unknown)
            })
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Category of an HTTP status code.
    ///
    /// ```
    /// use ensemble_error::ErrorCategory;
    ///
    /// assert_eq!(ErrorCategory::from_status(503), ErrorCategory::UpstreamGenerationFailure);
    /// assert_eq!(ErrorCategory::from_status(404), ErrorCategory::Unknown);
    /// ```
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorCategory::RateLimited,
            408 => ErrorCategory::NetworkTimeout,
            500..=599 => ErrorCategory::UpstreamGenerationFailure,
            401 | 403 => ErrorCategory::Configuration,
            400 | 422 => ErrorCategory::Validation,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether failures in this category are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::RateLimited
                | ErrorCategory::NetworkTimeout
                | ErrorCategory::UpstreamGenerationFailure
        )
    }

    /// Whether failures in this category can never be compensated.
    ///
    /// Permanent failures are neither retried nor offered to fallbacks.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ErrorCategory::Validation | ErrorCategory::Configuration)
    }
}
