//! Top-level error wrapper types.

use crate::{BuilderError, CallError, ConfigError};

/// Union of every error the Ensemble crates surface.
///
/// # Examples
///
/// ```
/// use ensemble_error::{EnsembleError, ConfigError};
///
/// let err: EnsembleError = ConfigError::new("no providers configured").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum EnsembleErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// Provider call error
    #[from(CallError)]
    Call(CallError),
    /// Builder error
    #[from(BuilderError)]
    Builder(BuilderError),
}

/// Ensemble error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Ensemble Error: {}", _0)]
pub struct EnsembleError(Box<EnsembleErrorKind>);

impl EnsembleError {
    /// Create a new error from a kind.
    pub fn new(kind: EnsembleErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &EnsembleErrorKind {
        &self.0
    }
}

impl<T> From<T> for EnsembleError
where
    T: Into<EnsembleErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Ensemble operations.
pub type EnsembleResult<T> = std::result::Result<T, EnsembleError>;
