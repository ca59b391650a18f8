//! Resilient concurrent dispatch of rate-limited provider calls.
//!
//! This crate wires the focused crates into one [`Ensemble`]:
//!
//! - `ensemble_rate_limit` admits and retries each call,
//! - `ensemble_cache` short-circuits repeated lookups,
//! - `ensemble_recovery` substitutes values for unrecoverable failures and
//!   assembles degraded composites,
//! - `ensemble_dispatch` runs the batch under concurrency caps.
//!
//! Configuration is loaded by [`EnsembleConfig::load`] from the bundled
//! `ensemble.toml`, then `~/.config/ensemble/ensemble.toml`, then
//! `./ensemble.toml`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assemble;
mod config;
mod ensemble;
mod simulate;

pub use assemble::{CONFIDENCE_FIELD, DEFAULT_LIVE_CONFIDENCE, assemble, category_value};
pub use config::EnsembleConfig;
pub use ensemble::{Ensemble, EnsembleBuilder, EnsembleReport};
pub use simulate::{EXPERTS_PER_JOB, SimulatedProvider, simulated_tasks};

pub use ensemble_cache::*;
pub use ensemble_core::*;
pub use ensemble_dispatch::*;
pub use ensemble_error::*;
pub use ensemble_rate_limit::*;
pub use ensemble_recovery::*;
