//! Turns task outcomes into per-job category outcomes.

use ensemble_core::TaskState;
use ensemble_dispatch::{BatchResult, TaskOutcome};
use ensemble_recovery::{
    CategoryOutcomes, CategoryValue, CompositeResult, DEFAULT_VALUE_CONFIDENCE, DegradationManager,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Field of a task value carrying the model's own confidence.
pub const CONFIDENCE_FIELD: &str = "confidence";

/// Confidence of a live value that reports none.
pub const DEFAULT_LIVE_CONFIDENCE: f64 = 1.0;

/// Outcomes of the tasks sharing one job, in submission order.
#[derive(Debug, Default)]
struct JobOutcomes<'a> {
    requested: Vec<String>,
    tasks: Vec<&'a TaskOutcome>,
}

/// Assemble one composite per job in the batch.
///
/// Tasks are grouped by [`Task::job_key`](ensemble_core::Task::job_key).
/// When several tasks produce the same category, the live value with the
/// highest confidence wins.
pub fn assemble(manager: &DegradationManager, batch: &BatchResult) -> BTreeMap<String, CompositeResult> {
    let mut jobs: BTreeMap<String, JobOutcomes<'_>> = BTreeMap::new();
    for outcome in batch.outcomes() {
        let job = jobs.entry(outcome.task().job_key().to_string()).or_default();
        for category in outcome.task().result_categories() {
            if !job.requested.contains(category) {
                job.requested.push(category.clone());
            }
        }
        job.tasks.push(outcome);
    }

    jobs.into_iter()
        .map(|(job_id, job)| {
            let outcomes = category_outcomes(&job.tasks);
            let composite = manager.synthesize(&job_id, &job.requested, &outcomes);
            (job_id, composite)
        })
        .collect()
}

fn category_outcomes(tasks: &[&TaskOutcome]) -> CategoryOutcomes {
    let mut best: BTreeMap<String, CategoryValue> = BTreeMap::new();
    let mut outcomes = CategoryOutcomes::new();

    for outcome in tasks {
        let categories = outcome.task().result_categories();
        let sole = categories.len() == 1;
        for category in categories {
            let value = outcome
                .value()
                .as_ref()
                .and_then(|v| category_value(v, category, sole));
            match (outcome.state(), value) {
                (TaskState::Succeeded, Some(value)) => {
                    let better = best
                        .get(category)
                        .is_none_or(|current| value.confidence > current.confidence);
                    if better {
                        best.insert(category.clone(), value);
                    }
                }
                // A null substitute carries no information; let the
                // category back-fill instead.
                (TaskState::Degraded, Some(value)) if !value.value.is_null() => {
                    let strategy = outcome.fallback().clone().unwrap_or_default();
                    let capped = CategoryValue::new(
                        value.value,
                        value.confidence.min(DEFAULT_VALUE_CONFIDENCE),
                    );
                    outcomes.recover(category.clone(), capped, strategy);
                }
                _ => {
                    outcomes.fail(category.clone());
                }
            }
        }
    }

    for (category, value) in best {
        outcomes.succeed(category, value);
    }
    outcomes
}

/// Pull one category out of a task value.
///
/// An object yields the field named after the category, or nothing when
/// that field is absent. A non-object value is taken whole, but only for a
/// task producing a single category (`sole`). A numeric `confidence` field
/// on the object sets the confidence.
///
/// ```
/// use ensemble::category_value;
/// use serde_json::json;
///
/// let answer = json!({"winner": "away", "confidence": 0.7});
/// let winner = category_value(&answer, "winner", false).unwrap();
/// assert_eq!(winner.value, json!("away"));
/// assert!(category_value(&answer, "spread", false).is_none());
/// assert!(category_value(&json!(3.5), "spread", true).is_some());
/// ```
pub fn category_value(value: &JsonValue, category: &str, sole: bool) -> Option<CategoryValue> {
    match value {
        JsonValue::Object(fields) => {
            let extracted = fields.get(category)?.clone();
            let confidence = fields
                .get(CONFIDENCE_FIELD)
                .and_then(JsonValue::as_f64)
                .unwrap_or(DEFAULT_LIVE_CONFIDENCE);
            Some(CategoryValue::new(extracted, confidence))
        }
        whole if sole => Some(CategoryValue::new(whole.clone(), DEFAULT_LIVE_CONFIDENCE)),
        _ => None,
    }
}
