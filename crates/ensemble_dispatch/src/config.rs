//! Dispatcher configuration and scheduling strategies.

use derive_getters::Getters;
use ensemble_error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a batch of tasks is scheduled.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DispatchStrategy {
    /// One task at a time.
    Sequential,
    /// All tasks at once, bounded by the concurrency caps.
    #[default]
    Parallel,
    /// Fixed-size chunks run in parallel with a pause between chunks.
    Batch,
    /// Priority groups, highest first, with a pause between groups.
    Priority,
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_max_concurrent_per_provider() -> usize {
    3
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause_ms() -> u64 {
    500
}

fn default_group_pause_ms() -> u64 {
    250
}

/// Dispatcher limits and pacing.
///
/// ```toml
/// [dispatch]
/// max_concurrent_tasks = 10
/// max_concurrent_per_provider = 3
/// batch_size = 10
/// batch_pause_ms = 500
/// group_pause_ms = 250
/// task_timeout_secs = 120
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct DispatchConfig {
    /// Tasks in flight across all providers.
    #[serde(default = "default_max_concurrent_tasks")]
    max_concurrent_tasks: usize,
    /// Tasks in flight against one provider.
    #[serde(default = "default_max_concurrent_per_provider")]
    max_concurrent_per_provider: usize,
    /// Chunk size for the batch strategy.
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    /// Pause between chunks.
    #[serde(default = "default_batch_pause_ms")]
    batch_pause_ms: u64,
    /// Pause between priority groups.
    #[serde(default = "default_group_pause_ms")]
    group_pause_ms: u64,
    /// Overall budget per task, excluding time spent waiting for a slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task_timeout_secs: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            max_concurrent_per_provider: default_max_concurrent_per_provider(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            group_pause_ms: default_group_pause_ms(),
            task_timeout_secs: None,
        }
    }
}

impl DispatchConfig {
    /// Sets both concurrency caps.
    pub fn with_limits(mut self, max_concurrent_tasks: usize, max_concurrent_per_provider: usize) -> Self {
        self.max_concurrent_tasks = max_concurrent_tasks;
        self.max_concurrent_per_provider = max_concurrent_per_provider;
        self
    }

    /// Sets the chunk size and the pause between chunks.
    pub fn with_batching(mut self, batch_size: usize, batch_pause_ms: u64) -> Self {
        self.batch_size = batch_size;
        self.batch_pause_ms = batch_pause_ms;
        self
    }

    /// Sets the pause between priority groups.
    pub fn with_group_pause_ms(mut self, group_pause_ms: u64) -> Self {
        self.group_pause_ms = group_pause_ms;
        self
    }

    /// Sets the per-task budget.
    pub fn with_task_timeout_secs(mut self, secs: u64) -> Self {
        self.task_timeout_secs = Some(secs);
        self
    }

    /// Pause between chunks.
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Pause between priority groups.
    pub fn group_pause(&self) -> Duration {
        Duration::from_millis(self.group_pause_ms)
    }

    /// Per-task budget.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a cap, the batch size, or the task timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::new("dispatch.max_concurrent_tasks must be greater than 0"));
        }
        if self.max_concurrent_per_provider == 0 {
            return Err(ConfigError::new(
                "dispatch.max_concurrent_per_provider must be greater than 0",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("dispatch.batch_size must be greater than 0"));
        }
        if self.task_timeout_secs == Some(0) {
            return Err(ConfigError::new("dispatch.task_timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}
