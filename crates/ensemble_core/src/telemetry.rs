//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset: info overall, debug for every
/// workspace crate. Targets match whole crate names, so each is listed.
pub const DEFAULT_FILTER: &str = concat!(
    "info",
    ",ensemble=debug",
    ",ensemble_error=debug",
    ",ensemble_core=debug",
    ",ensemble_rate_limit=debug",
    ",ensemble_cache=debug",
    ",ensemble_recovery=debug",
    ",ensemble_dispatch=debug",
);

/// Initialize console tracing.
///
/// Respects `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Safe to call
/// more than once; later calls are ignored.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::try_new("debug")?,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER)?,
    };

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }

    Ok(())
}
