//! Cache error types.

/// Specific cache error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CacheErrorKind {
    /// Key inputs could not be serialized.
    #[display("Failed to serialize cache key inputs: {}", _0)]
    KeySerialization(String),
    /// Invalid cache configuration.
    #[display("Invalid cache configuration: {}", _0)]
    Config(String),
}

/// Cache error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Cache Error: {} at line {} in {}", kind, line, file)]
pub struct CacheError {
    kind: CacheErrorKind,
    line: u32,
    file: &'static str,
}

impl CacheError {
    /// Create a new CacheError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CacheErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CacheErrorKind {
        &self.kind
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
