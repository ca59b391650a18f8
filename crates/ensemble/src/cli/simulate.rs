//! `simulate` command.

use super::load_config;
use ensemble::{
    ConfigError, DispatchStrategy, Ensemble, EnsembleResult, SimulatedProvider, simulated_tasks,
};
use std::path::Path;
use std::sync::Arc;

/// Dispatch `tasks` synthetic tasks and print batch and composite summaries.
pub async fn run_simulation(
    path: Option<&Path>,
    tasks: usize,
    failure_rate: f64,
    strategy: DispatchStrategy,
) -> EnsembleResult<()> {
    if !(0.0..=1.0).contains(&failure_rate) {
        return Err(ConfigError::new("failure rate must be between 0 and 1").into());
    }

    let config = load_config(path)?;
    let providers: Vec<String> = config.providers().keys().cloned().collect();
    let categories: Vec<String> = config.categories().keys().cloned().collect();
    let ensemble = Ensemble::from_config(config)?;

    let batch = simulated_tasks(tasks, &providers, &categories)?;
    let op = Arc::new(SimulatedProvider::new(failure_rate));
    let report = ensemble.run_batch(batch, strategy, op).await;

    let batch = report.batch();
    println!(
        "Batch ({}): {} tasks, {} succeeded, {} degraded, {} failed in {:.2}s",
        strategy,
        batch.total(),
        batch.succeeded(),
        batch.degraded(),
        batch.failed(),
        batch.metadata().duration().as_secs_f64()
    );
    for (provider, usage) in batch.metadata().provider_utilization() {
        println!(
            "  {}: {} tasks, peak {} in flight, {} failed",
            provider, usage.tasks, usage.peak_in_flight, usage.failed
        );
    }

    let stats = ensemble.call_stats();
    println!(
        "Calls: {} total, {:.0}% succeeded, {:.2} retries per call",
        stats.total,
        stats.success_rate() * 100.0,
        stats.average_retries_per_call()
    );

    println!("Composites:");
    for (job, composite) in report.composites() {
        println!(
            "  {} [{} / confidence {:.2}] {}",
            job,
            composite.degradation().level(),
            composite.confidence(),
            composite.explanation()
        );
    }
    println!("Worst degradation: {}", report.worst_level());
    Ok(())
}
