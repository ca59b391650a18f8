//! Tests for failure classification and severity.

use ensemble_error::{CallError, CallErrorKind, ErrorCategory};
use ensemble_recovery::{ErrorClassifier, ErrorContext, Severity};

#[test]
fn test_structured_kinds_map_directly() {
    let classifier = ErrorClassifier::new();
    let cases = [
        (
            CallErrorKind::RateLimited {
                message: "slow".into(),
                retry_after: None,
            },
            ErrorCategory::RateLimited,
        ),
        (CallErrorKind::Timeout("read".into()), ErrorCategory::NetworkTimeout),
        (CallErrorKind::Database("pool".into()), ErrorCategory::DatabaseUnavailable),
        (
            CallErrorKind::Generation("empty completion".into()),
            ErrorCategory::UpstreamGenerationFailure,
        ),
        (CallErrorKind::Parse("eof".into()), ErrorCategory::ResponseParseFailure),
        (CallErrorKind::Validation("bad".into()), ErrorCategory::Validation),
        (CallErrorKind::Authentication("key".into()), ErrorCategory::Configuration),
    ];
    for (kind, expected) in cases {
        assert_eq!(classifier.classify(&CallError::new(kind)), expected);
    }
}

#[test]
fn test_opaque_messages_use_keyword_table() {
    let classifier = ErrorClassifier::new();
    assert_eq!(
        classifier.classify(&CallError::other("HTTP 429: quota exhausted")),
        ErrorCategory::RateLimited
    );
    assert_eq!(
        classifier.classify(&CallError::other("could not deserialize JSON body")),
        ErrorCategory::ResponseParseFailure
    );
    assert_eq!(
        classifier.classify(&CallError::other("postgres connection pool timed out")),
        ErrorCategory::NetworkTimeout
    );
    assert_eq!(
        classifier.classify(&CallError::other("the moon is in the wrong phase")),
        ErrorCategory::Unknown
    );
}

#[test]
fn test_custom_rules_take_precedence() {
    let classifier = ErrorClassifier::new()
        .with_rule(r"(?i)pgvector", ErrorCategory::DatabaseUnavailable)
        .unwrap();
    assert_eq!(
        classifier.classify(&CallError::other("pgvector query timed out")),
        ErrorCategory::DatabaseUnavailable
    );
    // Structured kinds ignore custom rules.
    assert_eq!(
        classifier.classify(&CallError::new(CallErrorKind::Timeout("pgvector".into()))),
        ErrorCategory::NetworkTimeout
    );
}

#[test]
fn test_invalid_rule_is_rejected() {
    assert!(
        ErrorClassifier::new()
            .with_rule("(unclosed", ErrorCategory::Unknown)
            .is_err()
    );
}

#[test]
fn test_severity_table() {
    let classifier = ErrorClassifier::new();
    let first = ErrorContext::new("t", "p", 1);
    let third = ErrorContext::new("t", "p", 3);

    assert_eq!(
        classifier.severity_of(ErrorCategory::DatabaseUnavailable, &first),
        Severity::Critical
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::Configuration, &first),
        Severity::Critical
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::Validation, &first),
        Severity::Critical
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::UpstreamGenerationFailure, &first),
        Severity::Low
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::UpstreamGenerationFailure, &third),
        Severity::High
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::RateLimited, &third),
        Severity::Medium
    );
    assert_eq!(
        classifier.severity_of(ErrorCategory::NetworkTimeout, &third),
        Severity::Low
    );
}
