//! Configuration error types.

/// Configuration error with source location.
///
/// Raised when configuration cannot be loaded, parsed, or fails
/// validation. This is the only error that fails a whole batch run.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", message, line, file)]
pub struct ConfigError {
    /// Error message
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new ConfigError with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use ensemble_error::ConfigError;
    ///
    /// let err = ConfigError::new("max_concurrent_tasks must be greater than 0");
    /// assert!(err.message.contains("max_concurrent_tasks"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
