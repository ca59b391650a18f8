//! Errors from building tasks and retry settings.

/// Why a value could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BuilderErrorKind {
    /// A required field was never set.
    #[display("{} is missing required field '{}'", target, field)]
    MissingField {
        /// Type being built.
        target: &'static str,
        /// Field left unset.
        field: &'static str,
    },

    /// The builder's own validation rejected the combination of fields.
    #[display("{} rejected: {}", target, reason)]
    Rejected {
        /// Type being built.
        target: &'static str,
        /// Validation message.
        reason: String,
    },

    /// Task priority outside `1..=10`.
    #[display("priority must be in 1..=10, got {}", _0)]
    PriorityOutOfRange(u8),
}

/// Builder error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Builder Error: {} at line {} in {}", kind, line, file)]
pub struct BuilderError {
    kind: BuilderErrorKind,
    line: u32,
    file: &'static str,
}

impl BuilderError {
    /// Create a new builder error with caller location tracking.
    #[track_caller]
    pub fn new(kind: BuilderErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// A required field of `target` was never set.
    #[track_caller]
    pub fn missing(target: &'static str, field: &'static str) -> Self {
        Self::new(BuilderErrorKind::MissingField { target, field })
    }

    /// Validation of `target` failed.
    #[track_caller]
    pub fn rejected(target: &'static str, reason: impl Into<String>) -> Self {
        Self::new(BuilderErrorKind::Rejected {
            target,
            reason: reason.into(),
        })
    }

    /// Get the error kind.
    pub fn kind(&self) -> &BuilderErrorKind {
        &self.kind
    }
}
