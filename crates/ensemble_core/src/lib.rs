//! Core data types for the Ensemble task dispatch library.
//!
//! This crate provides the foundation data types shared by the rate
//! limiter, cache, recovery, and dispatcher crates.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod category;
mod provider;
mod task;
mod telemetry;

pub use category::{CategoryPriority, CategorySpec};
pub use provider::provider_of;
pub use task::{Task, TaskBuilder, TaskBuilderError, TaskPriority, TaskState};
pub use telemetry::{DEFAULT_FILTER, init_tracing};
