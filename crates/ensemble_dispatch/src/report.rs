//! Per-task outcomes and batch summaries.

use crate::DispatchStrategy;
use derive_getters::Getters;
use ensemble_core::{Task, TaskState};
use ensemble_error::CallError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

/// Final state of one dispatched task.
#[derive(Debug, Clone, Getters)]
pub struct TaskOutcome {
    /// The submitted task.
    task: Task,
    /// Succeeded, degraded, or failed.
    state: TaskState,
    /// Live, cached, or fallback value.
    value: Option<JsonValue>,
    /// Last call error. Present for degraded and failed tasks.
    error: Option<CallError>,
    /// Name of the fallback strategy that supplied the value.
    fallback: Option<String>,
    /// Call attempts. Zero for cache hits.
    attempts: u32,
    /// Whether the value came from the result cache.
    cached: bool,
    /// Whether any attempt hit a rate limit.
    rate_limited: bool,
    /// Time from slot acquisition to final state.
    duration: Duration,
}

impl TaskOutcome {
    pub(crate) fn live(task: Task, value: JsonValue, attempts: u32, rate_limited: bool, duration: Duration) -> Self {
        Self {
            task,
            state: TaskState::Succeeded,
            value: Some(value),
            error: None,
            fallback: None,
            attempts,
            cached: false,
            rate_limited,
            duration,
        }
    }

    pub(crate) fn from_cache(task: Task, value: JsonValue, duration: Duration) -> Self {
        Self {
            cached: true,
            ..Self::live(task, value, 0, false, duration)
        }
    }

    pub(crate) fn degraded(
        task: Task,
        value: JsonValue,
        strategy: String,
        error: CallError,
        attempts: u32,
        rate_limited: bool,
        duration: Duration,
    ) -> Self {
        Self {
            task,
            state: TaskState::Degraded,
            value: Some(value),
            error: Some(error),
            fallback: Some(strategy),
            attempts,
            cached: false,
            rate_limited,
            duration,
        }
    }

    pub(crate) fn failed(task: Task, error: CallError, attempts: u32, rate_limited: bool, duration: Duration) -> Self {
        Self {
            task,
            state: TaskState::Failed,
            value: None,
            error: Some(error),
            fallback: None,
            attempts,
            cached: false,
            rate_limited,
            duration,
        }
    }

    /// Whether the task produced any value, live or substituted.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// Per-provider usage within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Tasks routed to the provider.
    pub tasks: usize,
    /// Highest number of tasks in flight at once.
    pub peak_in_flight: usize,
    /// Tasks that ended without a value.
    pub failed: usize,
}

/// How a batch was scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct BatchMetadata {
    /// Strategy used.
    strategy: DispatchStrategy,
    /// Sizes of the chunks or priority groups, in execution order.
    group_sizes: Vec<usize>,
    /// Usage keyed by provider bucket.
    provider_utilization: BTreeMap<String, ProviderUsage>,
    /// Wall time for the batch.
    duration: Duration,
}

impl BatchMetadata {
    pub(crate) fn new(
        strategy: DispatchStrategy,
        group_sizes: Vec<usize>,
        provider_utilization: BTreeMap<String, ProviderUsage>,
        duration: Duration,
    ) -> Self {
        Self {
            strategy,
            group_sizes,
            provider_utilization,
            duration,
        }
    }
}

/// Outcomes of one batch, in submission order.
#[derive(Debug, Clone, Getters)]
pub struct BatchResult {
    /// One outcome per submitted task.
    outcomes: Vec<TaskOutcome>,
    /// Scheduling details.
    metadata: BatchMetadata,
}

impl BatchResult {
    pub(crate) fn new(outcomes: Vec<TaskOutcome>, metadata: BatchMetadata) -> Self {
        Self { outcomes, metadata }
    }

    /// Tasks submitted.
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Tasks with a live or cached value.
    pub fn succeeded(&self) -> usize {
        self.count(TaskState::Succeeded)
    }

    /// Tasks rescued by a fallback.
    pub fn degraded(&self) -> usize {
        self.count(TaskState::Degraded)
    }

    /// Tasks without a value.
    pub fn failed(&self) -> usize {
        self.count(TaskState::Failed)
    }

    /// Fraction of tasks that produced any value.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        (self.succeeded() + self.degraded()) as f64 / self.total() as f64
    }

    /// Outcome for a task id.
    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task.id() == task_id)
    }

    /// Consume into the outcomes.
    pub fn into_outcomes(self) -> Vec<TaskOutcome> {
        self.outcomes
    }

    fn count(&self, state: TaskState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}
