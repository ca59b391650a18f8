//! Command-line interface module.

mod commands;
mod simulate;
mod validate;

pub use commands::{Cli, Commands};
pub use simulate::run_simulation;
pub use validate::show_config;

use ensemble::{EnsembleConfig, EnsembleResult};
use std::path::Path;

/// Load from `path`, or through the usual precedence when absent.
fn load_config(path: Option<&Path>) -> EnsembleResult<EnsembleConfig> {
    match path {
        Some(path) => EnsembleConfig::from_file(path),
        None => EnsembleConfig::load(),
    }
}
