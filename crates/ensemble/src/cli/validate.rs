//! `validate` command.

use super::load_config;
use ensemble::EnsembleResult;
use std::path::Path;

/// Print a summary of the resolved configuration.
pub fn show_config(path: Option<&Path>) -> EnsembleResult<()> {
    let config = load_config(path)?;
    config.validate_for_run()?;

    let dispatch = config.dispatch();
    println!("Configuration OK");
    println!(
        "  dispatch: {} tasks, {} per provider, batches of {}",
        dispatch.max_concurrent_tasks(),
        dispatch.max_concurrent_per_provider(),
        dispatch.batch_size()
    );
    if let Some(timeout) = dispatch.task_timeout() {
        println!("  task timeout: {}s", timeout.as_secs());
    }

    let retry = config.retry();
    println!(
        "  retry: {} retries, {} backoff from {}ms to {}ms",
        retry.max_retries(),
        retry.strategy(),
        retry.base_delay_ms(),
        retry.max_delay_ms()
    );

    let cache = config.cache();
    println!(
        "  cache: {} entries, default ttl {}s{}",
        cache.max_entries(),
        cache.default_ttl_secs(),
        if *cache.enabled() { "" } else { " (disabled)" }
    );

    println!("  providers:");
    for (name, limits) in config.providers() {
        let burst = limits
            .burst_capacity
            .map(|b| format!(", burst {}", b))
            .unwrap_or_default();
        println!(
            "    {}: {} rpm{} ({})",
            name, limits.requests_per_minute, burst, limits.algorithm
        );
    }

    println!("  categories:");
    for (name, spec) in config.categories() {
        let depends = if spec.depends_on.is_empty() {
            String::new()
        } else {
            format!(", depends on {}", spec.depends_on.join(", "))
        };
        let fallback = if spec.has_fallback { "fallback" } else { "no fallback" };
        println!("    {}: {}, {}{}", name, spec.priority, fallback, depends);
    }
    Ok(())
}
