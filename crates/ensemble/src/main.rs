//! Ensemble CLI binary.
//!
//! - Validate and summarise the resolved configuration
//! - Run a synthetic batch against a simulated provider

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use cli::{Cli, Commands, run_simulation, show_config};

    let cli = Cli::parse();
    ensemble::init_tracing(cli.verbose)?;

    match cli.command {
        Commands::Validate { config } => {
            show_config(config.as_deref())?;
        }

        Commands::Simulate {
            tasks,
            failure_rate,
            strategy,
            config,
        } => {
            run_simulation(config.as_deref(), tasks, failure_rate, strategy).await?;
        }
    }

    Ok(())
}
