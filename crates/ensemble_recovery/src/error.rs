//! Recovery error types.

/// Specific recovery error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum RecoveryErrorKind {
    /// A classification rule did not compile.
    #[display("Invalid classification pattern '{}': {}", pattern, reason)]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },
    /// A dependency names a category with no spec.
    #[display("Category '{}' depends on unknown category '{}'", category, dependency)]
    UnknownDependency {
        /// Dependent category
        category: String,
        /// Missing dependency
        dependency: String,
    },
}

/// Recovery error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Recovery Error: {} at line {} in {}", kind, line, file)]
pub struct RecoveryError {
    kind: RecoveryErrorKind,
    line: u32,
    file: &'static str,
}

impl RecoveryError {
    /// Create a new RecoveryError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RecoveryErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RecoveryErrorKind {
        &self.kind
    }
}

/// Result alias for recovery setup.
pub type RecoveryResult<T> = Result<T, RecoveryError>;
