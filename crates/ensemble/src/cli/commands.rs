//! CLI command definitions.

use clap::{Parser, Subcommand};
use ensemble::DispatchStrategy;
use std::path::PathBuf;

/// Ensemble - resilient concurrent dispatch of rate-limited provider calls
#[derive(Parser, Debug)]
#[command(name = "ensemble")]
#[command(about = "Resilient concurrent dispatch of rate-limited provider calls", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the resolved configuration and print a summary
    Validate {
        /// Load this file instead of the layered defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a synthetic batch against a simulated provider
    Simulate {
        /// Number of tasks to dispatch
        #[arg(long, default_value = "20")]
        tasks: usize,

        /// Fraction of calls that fail
        #[arg(long, default_value = "0.1")]
        failure_rate: f64,

        /// Scheduling strategy (sequential, parallel, batch, priority)
        #[arg(long, default_value = "parallel")]
        strategy: DispatchStrategy,

        /// Load this file instead of the layered defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
