//! Error types for the Ensemble task dispatch library.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Retry and fallback decisions are made on [`CallErrorKind`] and
//! [`ErrorCategory`]. Free-text matching is only used to categorise
//! opaque [`CallErrorKind::Other`] messages.
//!
//! # Examples
//!
//! ```
//! use ensemble_error::{CallError, CallErrorKind, EnsembleResult};
//!
//! fn call_provider() -> EnsembleResult<String> {
//!     Err(CallError::new(CallErrorKind::Timeout("read timed out".into())))?
//! }
//!
//! assert!(call_provider().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod call;
mod category;
mod config;
mod error;

pub use builder::{BuilderError, BuilderErrorKind};
pub use call::{CallError, CallErrorKind, RetryableError};
pub use category::ErrorCategory;
pub use config::ConfigError;
pub use error::{EnsembleError, EnsembleErrorKind, EnsembleResult};
