//! Hooks for per-call and per-batch telemetry.

use crate::DispatchStrategy;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

/// One logical provider call, after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    /// Task that made the call.
    pub task_id: String,
    /// Provider bucket the call was charged to.
    pub provider: String,
    /// Whether the call returned a value.
    pub success: bool,
    /// Attempts made.
    pub attempts: u32,
    /// Whether any attempt hit a rate limit.
    pub rate_limited: bool,
    /// Wall time from first attempt to final result.
    pub duration: Duration,
    /// Error category of the final failure, if any.
    pub error_category: Option<String>,
}

/// A finished batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEvent {
    /// Strategy the batch ran under.
    pub strategy: DispatchStrategy,
    /// Tasks submitted.
    pub total: usize,
    /// Tasks with a live or cached value.
    pub succeeded: usize,
    /// Tasks rescued by a fallback.
    pub degraded: usize,
    /// Tasks without a value.
    pub failed: usize,
    /// Wall time for the whole batch.
    pub duration: Duration,
}

/// Receives dispatcher events.
///
/// Observers run inline on the dispatching task and must not block.
pub trait CallObserver: Send + Sync + Debug {
    /// Called once per logical call.
    fn on_call(&self, event: &CallEvent);

    /// Called once per finished batch.
    fn on_batch(&self, _event: &BatchEvent) {}
}

/// Emits events as structured tracing records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn on_call(&self, event: &CallEvent) {
        debug!(
            task_id = %event.task_id,
            provider = %event.provider,
            success = event.success,
            attempts = event.attempts,
            rate_limited = event.rate_limited,
            duration_ms = event.duration.as_millis() as u64,
            error_category = event.error_category.as_deref(),
            "Provider call finished"
        );
    }

    fn on_batch(&self, event: &BatchEvent) {
        info!(
            strategy = %event.strategy,
            total = event.total,
            succeeded = event.succeeded,
            degraded = event.degraded,
            failed = event.failed,
            duration_ms = event.duration.as_millis() as u64,
            "Batch finished"
        );
    }
}
