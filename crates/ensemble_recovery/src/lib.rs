//! Error classification, fallback strategies, and graceful degradation.
//!
//! - [`ErrorClassifier`] maps a [`CallError`](ensemble_error::CallError)
//!   to an [`ErrorCategory`](ensemble_error::ErrorCategory) and a [`Severity`].
//! - [`FallbackRegistry`] offers unrecoverable failures to registered
//!   [`FallbackStrategy`] implementations and records every failure in an
//!   [`ErrorHistory`].
//! - [`DegradationManager`] turns per-category outcomes into one
//!   [`CompositeResult`] with a [`DegradationLevel`] and confidence.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod classifier;
mod degradation;
mod error;
mod fallback;
mod record;
mod resolver;

pub use classifier::{ErrorClassifier, Severity};
pub use degradation::{
    CategoryOutcomes, CategoryValue, CompositeResult, DEFAULT_VALUE_CONFIDENCE, DegradationLevel,
    DegradationManager, DegradationResult, MIN_CONFIDENCE, ResolvedCategory, ValueSource,
};
pub use error::{RecoveryError, RecoveryErrorKind, RecoveryResult};
pub use fallback::{
    CachedFallback, FallbackRegistry, FallbackStrategy, Recovered, SkipFallback, StaticFallback,
};
pub use record::{DEFAULT_HISTORY_CAPACITY, ErrorContext, ErrorHistory, ErrorRecord};
pub use resolver::{DependencyResolver, FnResolver, InheritResolver};
