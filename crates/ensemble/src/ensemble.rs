//! Wires every component once and runs batches end to end.

use crate::{EnsembleConfig, assemble};
use derive_getters::Getters;
use ensemble_cache::{CacheSweeper, ResultCache};
use ensemble_core::Task;
use ensemble_dispatch::{
    BatchResult, CallObserver, DispatchStrategy, TaskDispatcher, TaskOperation,
};
use ensemble_error::{ConfigError, EnsembleResult};
use ensemble_rate_limit::{CallManager, CallStatsSnapshot, RateLimiter};
use ensemble_recovery::{
    CachedFallback, CompositeResult, DegradationLevel, DegradationManager, DependencyResolver,
    ErrorClassifier, ErrorHistory, FallbackRegistry, FallbackStrategy,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of one batch run: per-task outcomes plus one composite per job.
#[derive(Debug, Clone, Getters)]
pub struct EnsembleReport {
    /// Per-task outcomes and scheduling metadata.
    batch: BatchResult,
    /// Composite result keyed by job id.
    composites: BTreeMap<String, CompositeResult>,
}

impl EnsembleReport {
    /// Composite for a job.
    pub fn composite(&self, job_id: &str) -> Option<&CompositeResult> {
        self.composites.get(job_id)
    }

    /// Most severe degradation across all jobs.
    pub fn worst_level(&self) -> DegradationLevel {
        self.composites
            .values()
            .map(|c| *c.degradation().level())
            .max()
            .unwrap_or(DegradationLevel::None)
    }
}

/// Rate limiter, cache, fallbacks, dispatcher, and degradation manager,
/// built once from an [`EnsembleConfig`] and shared by every batch.
///
/// ```no_run
/// use ensemble::{DispatchStrategy, Ensemble, EnsembleConfig, FnOperation, Task};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ensemble = Ensemble::from_config(EnsembleConfig::load()?)?;
/// let tasks = vec![
///     Task::builder()
///         .id("game-1/statistician")
///         .provider_id("openai/gpt-4o")
///         .job_id("game-1")
///         .category("winner")
///         .build()?,
/// ];
/// let op = Arc::new(FnOperation::new(|_task: Task| async { Ok(json!({"winner": "home"})) }));
///
/// let report = ensemble.run_batch(tasks, DispatchStrategy::Parallel, op).await;
/// println!("{}", report.composite("game-1").unwrap().explanation());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Ensemble {
    config: EnsembleConfig,
    dispatcher: TaskDispatcher,
    degradation: DegradationManager,
    cache: Arc<ResultCache>,
    history: Arc<ErrorHistory>,
    _sweeper: Option<CacheSweeper>,
}

impl Ensemble {
    /// Build with defaults: cached-value fallback, tracing observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or names no
    /// provider.
    pub fn from_config(config: EnsembleConfig) -> EnsembleResult<Self> {
        Self::builder(config).build()
    }

    /// Start a builder.
    pub fn builder(config: EnsembleConfig) -> EnsembleBuilder {
        EnsembleBuilder {
            config,
            classifier: ErrorClassifier::new(),
            strategies: Vec::new(),
            observers: Vec::new(),
            resolvers: Vec::new(),
            default_resolver: None,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Shared dispatcher.
    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    /// Composite assembler.
    pub fn degradation(&self) -> &DegradationManager {
        &self.degradation
    }

    /// Shared result cache.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Unrecoverable failures seen so far.
    pub fn history(&self) -> &Arc<ErrorHistory> {
        &self.history
    }

    /// Aggregate call counters.
    pub fn call_stats(&self) -> CallStatsSnapshot {
        self.dispatcher.calls().stats()
    }

    /// Dispatch a batch and assemble one composite per job.
    ///
    /// Partial failures never fail the call; they surface as task
    /// states and degradation levels in the report.
    #[instrument(skip(self, tasks, op), fields(tasks = tasks.len()))]
    pub async fn run_batch(
        &self,
        tasks: Vec<Task>,
        strategy: DispatchStrategy,
        op: Arc<dyn TaskOperation>,
    ) -> EnsembleReport {
        let batch = self.dispatcher.run(tasks, strategy, op).await;
        let composites = assemble(&self.degradation, &batch);

        info!(
            jobs = composites.len(),
            succeeded = batch.succeeded(),
            degraded = batch.degraded(),
            failed = batch.failed(),
            "Batch assembled"
        );
        EnsembleReport { batch, composites }
    }
}

/// Builder for [`Ensemble`].
pub struct EnsembleBuilder {
    config: EnsembleConfig,
    classifier: ErrorClassifier,
    strategies: Vec<Arc<dyn FallbackStrategy>>,
    observers: Vec<Arc<dyn CallObserver>>,
    resolvers: Vec<(String, Arc<dyn DependencyResolver>)>,
    default_resolver: Option<Arc<dyn DependencyResolver>>,
}

impl std::fmt::Debug for EnsembleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleBuilder")
            .field("config", &self.config)
            .field("strategies", &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}

impl EnsembleBuilder {
    /// Classifier with custom rules.
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Fallback strategy tried after the built-in cached-value fallback.
    pub fn fallback(mut self, strategy: Arc<dyn FallbackStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Add a dispatcher observer.
    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Resolver for one category's derived values.
    pub fn resolver(mut self, category: impl Into<String>, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.resolvers.push((category.into(), resolver));
        self
    }

    /// Resolver for categories without their own.
    pub fn default_resolver(mut self, resolver: Arc<dyn DependencyResolver>) -> Self {
        self.default_resolver = Some(resolver);
        self
    }

    /// Build every component.
    ///
    /// Starts the cache sweeper when called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or names no
    /// provider.
    pub fn build(self) -> EnsembleResult<Ensemble> {
        let config = self.config;
        config.validate_for_run()?;

        let limiter = Arc::new(RateLimiter::from_configs(config.providers()));
        let calls = Arc::new(CallManager::new(limiter));
        let cache = Arc::new(ResultCache::new(config.cache().clone()));
        let history = Arc::new(ErrorHistory::default());

        let fallbacks = Arc::new(FallbackRegistry::new(self.classifier, Arc::clone(&history)));
        fallbacks.register(Arc::new(CachedFallback::new(Arc::clone(&cache))));
        for strategy in self.strategies {
            fallbacks.register(strategy);
        }

        let mut dispatcher = TaskDispatcher::builder(config.dispatch().clone(), calls)
            .retry(config.retry().clone())
            .cache(Arc::clone(&cache))
            .fallbacks(fallbacks);
        for observer in self.observers {
            dispatcher = dispatcher.observer(observer);
        }
        let dispatcher = dispatcher.build()?;

        let mut degradation = DegradationManager::validated(config.categories().clone())
            .map_err(|e| ConfigError::new(format!("categories: {}", e.kind())))?;
        for (category, resolver) in self.resolvers {
            degradation = degradation.with_resolver(category, resolver);
        }
        if let Some(resolver) = self.default_resolver {
            degradation = degradation.with_default_resolver(resolver);
        }

        let sweeper = tokio::runtime::Handle::try_current()
            .ok()
            .filter(|_| *config.cache().enabled())
            .map(|_| cache.spawn_sweeper());

        info!(
            providers = config.providers().len(),
            categories = config.categories().len(),
            "Ensemble ready"
        );

        Ok(Ensemble {
            config,
            dispatcher,
            degradation,
            cache,
            history,
            _sweeper: sweeper,
        })
    }
}
