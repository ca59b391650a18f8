//! Failure classification and severity.

use crate::{ErrorContext, RecoveryError, RecoveryErrorKind, RecoveryResult};
use ensemble_error::{CallError, CallErrorKind, ErrorCategory};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of an unrecoverable failure.
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
pub enum Severity {
    /// Informational.
    Low,
    /// Degrades a result.
    Medium,
    /// Repeated upstream trouble.
    High,
    /// Nothing downstream can compensate.
    Critical,
}

/// Maps failures to categories and severities.
///
/// Structured [`CallErrorKind`]s map directly. Opaque
/// [`CallErrorKind::Other`] messages are matched against custom rules
/// first, then the built-in keyword table.
///
/// # Example
///
/// ```
/// use ensemble_error::{CallError, ErrorCategory};
/// use ensemble_recovery::ErrorClassifier;
///
/// let classifier = ErrorClassifier::new()
///     .with_rule(r"(?i)vector store .* offline", ErrorCategory::DatabaseUnavailable)
///     .unwrap();
///
/// let err = CallError::other("Vector store shard-3 offline");
/// assert_eq!(classifier.classify(&err), ErrorCategory::DatabaseUnavailable);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    rules: Vec<(Regex, ErrorCategory)>,
}

impl ErrorClassifier {
    /// Classifier with only the built-in table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule checked before the built-in table.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn with_rule(mut self, pattern: &str, category: ErrorCategory) -> RecoveryResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            RecoveryError::new(RecoveryErrorKind::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
        })?;
        self.rules.push((regex, category));
        Ok(self)
    }

    /// Category of a failed call.
    pub fn classify(&self, error: &CallError) -> ErrorCategory {
        match error.kind() {
            CallErrorKind::Other(message) => self.classify_message(message),
            kind => kind.category(),
        }
    }

    /// Category of free text.
    pub fn classify_message(&self, message: &str) -> ErrorCategory {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(message))
            .map(|(_, category)| *category)
            .unwrap_or_else(|| ErrorCategory::from_message(message))
    }

    /// Severity of a failure in `category` given its context.
    ///
    /// Database, configuration, and validation failures are critical.
    /// Upstream generation failures are high after more than one attempt
    /// and low on the first. Rate limiting is medium; everything else is
    /// low.
    pub fn severity_of(&self, category: ErrorCategory, context: &ErrorContext) -> Severity {
        match category {
            ErrorCategory::DatabaseUnavailable
            | ErrorCategory::Configuration
            | ErrorCategory::Validation => Severity::Critical,
            ErrorCategory::UpstreamGenerationFailure if *context.attempt() >= 2 => Severity::High,
            ErrorCategory::RateLimited => Severity::Medium,
            ErrorCategory::UpstreamGenerationFailure
            | ErrorCategory::NetworkTimeout
            | ErrorCategory::ResponseParseFailure
            | ErrorCategory::Unknown => Severity::Low,
        }
    }
}
