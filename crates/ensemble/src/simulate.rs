//! Synthetic provider for exercising a configuration without network calls.

use async_trait::async_trait;
use ensemble_core::{Task, TaskPriority};
use ensemble_dispatch::TaskOperation;
use ensemble_error::{BuilderError, CallError, CallErrorKind};
use rand::Rng;
use serde_json::{Map, Value as JsonValue, json};
use std::time::Duration;

/// Experts per simulated job.
pub const EXPERTS_PER_JOB: usize = 4;

/// Provider that answers after a random delay and fails at a fixed rate.
///
/// Failures are drawn from transient (503, timeout) and permanent
/// (validation) kinds so retries and fallbacks both get exercised.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    failure_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl SimulatedProvider {
    /// Provider failing a `failure_rate` fraction of calls.
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            min_latency: Duration::from_millis(20),
            max_latency: Duration::from_millis(200),
        }
    }

    /// Latency range of each call.
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }
}

#[async_trait]
impl TaskOperation for SimulatedProvider {
    async fn invoke(&self, task: &Task) -> Result<JsonValue, CallError> {
        let (latency, failure, answer) = {
            let mut rng = rand::thread_rng();
            let latency = rng.gen_range(self.min_latency..=self.max_latency);
            let failure = if rng.gen_bool(self.failure_rate) {
                Some(match rng.gen_range(0..3) {
                    0 => CallErrorKind::Http {
                        status: 503,
                        message: "simulated overload".to_string(),
                    },
                    1 => CallErrorKind::Timeout("simulated slow response".to_string()),
                    _ => CallErrorKind::Validation("simulated bad request".to_string()),
                })
            } else {
                None
            };

            let mut answer = Map::new();
            for category in task.result_categories() {
                let value = match category.as_str() {
                    "winner" => json!(if rng.gen_bool(0.5) { "home" } else { "away" }),
                    "spread" | "total" => json!((rng.gen_range(-150..=150) as f64) / 10.0),
                    _ => json!(rng.gen_range(0..100)),
                };
                answer.insert(category.clone(), value);
            }
            answer.insert("confidence".to_string(), json!(rng.gen_range(0.5..0.95)));
            (latency, failure, answer)
        };

        tokio::time::sleep(latency).await;
        match failure {
            Some(kind) => Err(CallError::new(kind)),
            None => Ok(JsonValue::Object(answer)),
        }
    }
}

/// Tasks for `count` simulated experts, [`EXPERTS_PER_JOB`] per job,
/// spread round-robin over `providers`.
///
/// # Errors
///
/// Returns an error if `providers` is empty.
pub fn simulated_tasks(
    count: usize,
    providers: &[String],
    categories: &[String],
) -> Result<Vec<Task>, BuilderError> {
    (0..count)
        .map(|i| {
            let provider = providers.get(i % providers.len().max(1)).cloned().unwrap_or_default();
            let mut builder = Task::builder();
            builder
                .id(format!("job-{}/expert-{}", i / EXPERTS_PER_JOB, i % EXPERTS_PER_JOB))
                .provider_id(provider)
                .job_id(format!("job-{}", i / EXPERTS_PER_JOB))
                .priority(TaskPriority::clamped(10 - (i % EXPERTS_PER_JOB) as u8 * 2))
                .payload(json!({"expert": i % EXPERTS_PER_JOB}));
            for category in categories {
                builder.category(category.clone());
            }
            builder.build()
        })
        .collect()
}
