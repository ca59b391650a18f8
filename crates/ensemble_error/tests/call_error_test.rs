//! Tests for call error classification and retryability.

use ensemble_error::{CallError, CallErrorKind, ErrorCategory, RetryableError};
use std::time::Duration;

fn http(status: u16) -> CallError {
    CallError::new(CallErrorKind::Http {
        status,
        message: format!("status {}", status),
    })
}

#[test]
fn test_transient_http_statuses_are_retryable() {
    for status in [408, 429, 500, 502, 503, 504] {
        assert!(http(status).is_retryable(), "{} should be retryable", status);
    }
}

#[test]
fn test_permanent_http_statuses_are_not_retryable() {
    for status in [400, 401, 403, 404, 422] {
        assert!(!http(status).is_retryable(), "{} should not be retryable", status);
    }
}

#[test]
fn test_http_status_categories() {
    assert_eq!(http(429).category(), ErrorCategory::RateLimited);
    assert_eq!(http(408).category(), ErrorCategory::NetworkTimeout);
    assert_eq!(http(503).category(), ErrorCategory::UpstreamGenerationFailure);
    assert_eq!(http(401).category(), ErrorCategory::Configuration);
    assert_eq!(http(422).category(), ErrorCategory::Validation);
    assert_eq!(http(404).category(), ErrorCategory::Unknown);
}

#[test]
fn test_structured_kinds() {
    let timeout = CallError::new(CallErrorKind::Timeout("read".into()));
    assert!(timeout.is_retryable());
    assert_eq!(timeout.category(), ErrorCategory::NetworkTimeout);

    let validation = CallError::new(CallErrorKind::Validation("bad payload".into()));
    assert!(!validation.is_retryable());
    assert!(validation.category().is_permanent());

    let auth = CallError::new(CallErrorKind::Authentication("bad key".into()));
    assert!(!auth.is_retryable());
    assert_eq!(auth.category(), ErrorCategory::Configuration);

    let db = CallError::new(CallErrorKind::Database("pool exhausted".into()));
    assert!(!db.is_retryable());
    assert_eq!(db.category(), ErrorCategory::DatabaseUnavailable);

    let parse = CallError::new(CallErrorKind::Parse("missing field".into()));
    assert!(!parse.is_retryable());
}

#[test]
fn test_deadline_is_never_retried() {
    let err = CallError::new(CallErrorKind::DeadlineExceeded(30_000));
    assert!(!err.is_retryable());
    assert_eq!(err.category(), ErrorCategory::NetworkTimeout);
}

#[test]
fn test_opaque_messages_are_classified_by_text() {
    assert!(CallError::other("upstream said: Too Many Requests").is_retryable());
    assert!(CallError::other("connection reset by peer").is_retryable());
    assert!(CallError::other("503 Service Unavailable").is_retryable());
    assert!(!CallError::other("invalid input: team name missing").is_retryable());
    assert!(!CallError::other("something odd happened").is_retryable());
}

#[test]
fn test_digits_inside_parse_failures_are_not_status_codes() {
    let err = CallError::other("failed to parse response: unexpected token at byte 1500");
    assert_eq!(err.category(), ErrorCategory::ResponseParseFailure);
    assert!(!err.is_retryable());

    let err = CallError::other("could not deserialize payload: expected 429 chars");
    assert_eq!(err.category(), ErrorCategory::ResponseParseFailure);
    assert!(!err.is_retryable());

    assert_eq!(
        ErrorCategory::from_message("request id 45001 took 5000ms"),
        ErrorCategory::Unknown
    );
}

#[test]
fn test_standalone_status_codes_in_messages() {
    assert_eq!(
        ErrorCategory::from_message("upstream returned status=502"),
        ErrorCategory::UpstreamGenerationFailure
    );
    assert_eq!(ErrorCategory::from_message("HTTP 401"), ErrorCategory::Configuration);
    assert_eq!(ErrorCategory::from_message("got 404 then 429"), ErrorCategory::RateLimited);
    assert!(CallError::other("provider answered 503").is_retryable());
}

#[test]
fn test_retry_after_is_exposed() {
    let err = CallError::new(CallErrorKind::RateLimited {
        message: "slow down".into(),
        retry_after: Some(Duration::from_secs(7)),
    });
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(http(503).retry_after(), None);
}

#[test]
fn test_location_is_tracked() {
    let err = CallError::other("boom");
    assert!(err.file.ends_with("call_error_test.rs"));
    assert!(format!("{}", err).contains("boom"));
}
