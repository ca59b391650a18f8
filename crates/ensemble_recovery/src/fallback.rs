//! Substitute-value strategies and the registry that applies them.

use crate::{ErrorClassifier, ErrorContext, ErrorHistory, ErrorRecord, Severity};
use async_trait::async_trait;
use ensemble_cache::{ResultCache, stale_key};
use ensemble_error::{CallError, ErrorCategory};
use serde_json::Value as JsonValue;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Produces a substitute value for a failed call.
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    /// Name recorded in [`ErrorRecord::fallback_applied`].
    fn name(&self) -> &str;

    /// Whether this strategy can stand in for a failure of `category`.
    fn is_applicable(&self, category: ErrorCategory, context: &ErrorContext) -> bool;

    /// Produce the substitute value.
    async fn apply(&self, context: &ErrorContext, error: &CallError) -> Result<JsonValue, CallError>;
}

/// Always substitutes a fixed value.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    name: String,
    value: JsonValue,
    categories: Option<Vec<ErrorCategory>>,
}

impl StaticFallback {
    /// Fallback returning `value` for any category.
    pub fn new(name: impl Into<String>, value: JsonValue) -> Self {
        Self {
            name: name.into(),
            value,
            categories: None,
        }
    }

    /// Restrict to the given categories.
    pub fn for_categories(mut self, categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        self.categories = Some(categories.into_iter().collect());
        self
    }
}

#[async_trait]
impl FallbackStrategy for StaticFallback {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_applicable(&self, category: ErrorCategory, _context: &ErrorContext) -> bool {
        self.categories
            .as_ref()
            .is_none_or(|categories| categories.contains(&category))
    }

    async fn apply(&self, _context: &ErrorContext, _error: &CallError) -> Result<JsonValue, CallError> {
        Ok(self.value.clone())
    }
}

/// Serves the last good value for the task's cache key.
///
/// Looks up the long-lived copy first, then the primary entry.
#[derive(Debug, Clone)]
pub struct CachedFallback {
    cache: Arc<ResultCache>,
}

impl CachedFallback {
    /// Fallback backed by `cache`.
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl FallbackStrategy for CachedFallback {
    fn name(&self) -> &str {
        "cached"
    }

    fn is_applicable(&self, _category: ErrorCategory, context: &ErrorContext) -> bool {
        context.cache_key().is_some()
    }

    async fn apply(&self, context: &ErrorContext, _error: &CallError) -> Result<JsonValue, CallError> {
        let Some(key) = context.cache_key() else {
            return Err(CallError::other("no cache key for cached fallback"));
        };
        self.cache
            .get(&stale_key(key))
            .or_else(|| self.cache.get(key))
            .ok_or_else(|| CallError::other(format!("no cached value under {}", key)))
    }
}

/// Substitutes `null` for optional lookups.
///
/// Suits auxiliary calls such as memory retrieval whose absence only
/// weakens a result.
#[derive(Debug, Clone, Default)]
pub struct SkipFallback {
    categories: Vec<ErrorCategory>,
}

impl SkipFallback {
    /// Skip any transient failure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip only failures of the given categories.
    pub fn for_categories(categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
        }
    }
}

#[async_trait]
impl FallbackStrategy for SkipFallback {
    fn name(&self) -> &str {
        "skip"
    }

    fn is_applicable(&self, category: ErrorCategory, _context: &ErrorContext) -> bool {
        if self.categories.is_empty() {
            category.is_transient()
        } else {
            self.categories.contains(&category)
        }
    }

    async fn apply(&self, _context: &ErrorContext, _error: &CallError) -> Result<JsonValue, CallError> {
        Ok(JsonValue::Null)
    }
}

/// Value substituted by a fallback strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    /// Substitute value.
    pub value: JsonValue,
    /// Strategy that produced it.
    pub strategy: String,
    /// Record of the original failure.
    pub record: ErrorRecord,
}

type Registration = (Option<ErrorCategory>, Arc<dyn FallbackStrategy>);

/// Holds fallback strategies and records every unrecoverable failure.
///
/// Strategies are tried in registration order; the first applicable one
/// that succeeds wins. Permanent failures (validation, configuration)
/// are recorded as critical and never offered to a strategy.
pub struct FallbackRegistry {
    classifier: ErrorClassifier,
    strategies: RwLock<Vec<Registration>>,
    history: Arc<ErrorHistory>,
}

impl std::fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|(_, strategy)| strategy.name().to_string())
            .collect();
        f.debug_struct("FallbackRegistry")
            .field("classifier", &self.classifier)
            .field("strategies", &names)
            .field("history_len", &self.history.len())
            .finish()
    }
}

impl Default for FallbackRegistry {
    fn default() -> Self {
        Self::new(ErrorClassifier::new(), Arc::new(ErrorHistory::default()))
    }
}

impl FallbackRegistry {
    /// Registry with no strategies.
    pub fn new(classifier: ErrorClassifier, history: Arc<ErrorHistory>) -> Self {
        Self {
            classifier,
            strategies: RwLock::new(Vec::new()),
            history,
        }
    }

    /// Classifier used for failures.
    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Shared error history.
    pub fn history(&self) -> &Arc<ErrorHistory> {
        &self.history
    }

    /// Register a strategy consulted for every category.
    pub fn register(&self, strategy: Arc<dyn FallbackStrategy>) {
        self.push(None, strategy);
    }

    /// Register a strategy consulted only for `category`.
    pub fn register_for(&self, category: ErrorCategory, strategy: Arc<dyn FallbackStrategy>) {
        self.push(Some(category), strategy);
    }

    fn push(&self, category: Option<ErrorCategory>, strategy: Arc<dyn FallbackStrategy>) {
        debug!(strategy = strategy.name(), category = ?category, "Registering fallback strategy");
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((category, strategy));
    }

    /// Registered strategy count.
    pub fn len(&self) -> usize {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no strategies are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Registration> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Try to substitute a value for an unrecoverable failure.
    ///
    /// # Errors
    ///
    /// Returns the original error when the failure is permanent or no
    /// applicable strategy succeeds.
    #[instrument(
        skip(self, context, failure),
        fields(task_id = %context.task_id(), provider = %context.provider_id())
    )]
    pub async fn recover(&self, context: &ErrorContext, failure: &CallError) -> Result<Recovered, CallError> {
        let category = self.classifier.classify(failure);
        let message = failure.kind().to_string();

        if category.is_permanent() {
            error!(%category, error = %message, "Permanent failure, no fallback can compensate");
            self.history.record(ErrorRecord::new(
                category,
                Severity::Critical,
                message,
                context.clone(),
                None,
            ));
            return Err(failure.clone());
        }

        let severity = self.classifier.severity_of(category, context);
        let candidates = self.snapshot();

        for (registered_for, strategy) in candidates {
            if registered_for.is_some_and(|c| c != category) {
                continue;
            }
            if !strategy.is_applicable(category, context) {
                continue;
            }
            match strategy.apply(context, failure).await {
                Ok(value) => {
                    info!(strategy = strategy.name(), %category, "Fallback applied");
                    let record = ErrorRecord::new(
                        category,
                        severity,
                        message,
                        context.clone(),
                        Some(strategy.name().to_string()),
                    );
                    self.history.record(record.clone());
                    return Ok(Recovered {
                        value,
                        strategy: strategy.name().to_string(),
                        record,
                    });
                }
                Err(e) => {
                    debug!(strategy = strategy.name(), error = %e.kind(), "Fallback strategy failed");
                }
            }
        }

        warn!(%category, %severity, error = %message, "No fallback applied");
        self.history
            .record(ErrorRecord::new(category, severity, message, context.clone(), None));
        Err(failure.clone())
    }
}

