//! Units of dispatched work.

use ensemble_error::{BuilderError, BuilderErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Dispatch priority between 1 (lowest) and 10 (highest).
///
/// # Examples
///
/// ```
/// use ensemble_core::TaskPriority;
///
/// assert_eq!(TaskPriority::default().value(), 5);
/// assert_eq!(TaskPriority::clamped(42).value(), 10);
/// assert!(TaskPriority::try_from(0).is_err());
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct TaskPriority(u8);

impl TaskPriority {
    /// Lowest priority.
    pub const MIN: u8 = 1;
    /// Highest priority.
    pub const MAX: u8 = 10;

    /// Priority clamped into `1..=10`.
    pub fn clamped(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    /// Raw priority value.
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self(5)
    }
}

impl TryFrom<u8> for TaskPriority {
    type Error = BuilderError;

    #[track_caller]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(BuilderError::new(BuilderErrorKind::PriorityOutOfRange(value)))
        }
    }
}

impl From<TaskPriority> for u8 {
    fn from(priority: TaskPriority) -> Self {
        priority.0
    }
}

/// Terminal state of a dispatched task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    /// Live result obtained (possibly from cache).
    Succeeded,
    /// Live call failed and a fallback value stands in.
    Degraded,
    /// No value could be produced.
    Failed,
}

/// One unit of work against a provider.
///
/// A task produces one or more named result categories. Tasks that share
/// a `job_id` are assembled into one composite result after dispatch.
///
/// # Examples
///
/// ```
/// use ensemble_core::{Task, TaskPriority};
/// use serde_json::json;
///
/// let task = Task::builder()
///     .id("game-17/statistician")
///     .provider_id("openai/gpt-4o")
///     .priority(TaskPriority::clamped(8))
///     .payload(json!({"expert": "statistician"}))
///     .category("winner")
///     .category("spread")
///     .job_id("game-17")
///     .build()
///     .unwrap();
///
/// assert_eq!(task.result_categories().len(), 2);
/// assert_eq!(task.job_id().as_deref(), Some("game-17"));
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    derive_builder::Builder,
    derive_getters::Getters,
)]
#[builder(
    setter(into),
    build_fn(private, name = "build_internal", validate = "Self::validate")
)]
pub struct Task {
    /// Unique task identifier.
    id: String,
    /// Provider identifier, either bare (`openai`) or `provider/model`.
    provider_id: String,
    /// Dispatch priority.
    #[builder(default)]
    priority: TaskPriority,
    /// Opaque input handed to the task operation.
    #[builder(default)]
    payload: JsonValue,
    /// Result categories this task produces.
    #[builder(default, setter(each(name = "category", into)))]
    result_categories: Vec<String>,
    /// Job the task belongs to; tasks without one form their own job.
    #[builder(default, setter(into, strip_option))]
    job_id: Option<String>,
    /// Deterministic cache key covering every input that affects the result.
    #[builder(default, setter(into, strip_option))]
    cache_key: Option<String>,
}

impl Task {
    /// Creates a new task builder.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    /// Job key used when assembling composites.
    pub fn job_key(&self) -> &str {
        self.job_id.as_deref().unwrap_or(&self.id)
    }
}

impl TaskBuilder {
    /// Build the Task.
    ///
    /// # Errors
    ///
    /// Returns error if `id` or `provider_id` is missing or empty.
    pub fn build(&self) -> Result<Task, BuilderError> {
        self.build_internal().map_err(|e| match e {
            TaskBuilderError::UninitializedField(field) => BuilderError::missing("Task", field),
            TaskBuilderError::ValidationError(reason) => BuilderError::rejected("Task", reason),
        })
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(id) = &self.id
            && id.trim().is_empty()
        {
            return Err("task id must not be empty".to_string());
        }
        if let Some(provider) = &self.provider_id
            && provider.trim().is_empty()
        {
            return Err("provider_id must not be empty".to_string());
        }
        Ok(())
    }
}
