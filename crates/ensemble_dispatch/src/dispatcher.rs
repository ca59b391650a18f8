//! Concurrent task dispatch.

use crate::{
    BatchEvent, BatchMetadata, BatchResult, CallEvent, CallObserver, DispatchConfig,
    DispatchStrategy, ProviderUsage, TaskOperation, TaskOutcome, TracingObserver,
};
use ensemble_cache::{EntryType, ResultCache};
use ensemble_core::{Task, TaskState, provider_of};
use ensemble_error::{CallError, CallErrorKind, ConfigError};
use ensemble_rate_limit::{CallManager, RetryConfig};
use ensemble_recovery::{ErrorContext, FallbackRegistry};
use futures::future::join_all;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Runs tasks under global and per-provider concurrency caps.
///
/// Each task takes one global slot and one slot for its provider bucket,
/// then runs through the [`CallManager`] (rate limit and retry), the
/// optional [`ResultCache`], and the [`FallbackRegistry`]. A failing or
/// panicking task never affects its siblings.
///
/// The dispatcher is cheap to clone; clones share slots and collaborators.
///
/// # Example
///
/// ```
/// use ensemble_core::Task;
/// use ensemble_dispatch::{DispatchConfig, DispatchStrategy, FnOperation, TaskDispatcher};
/// use ensemble_rate_limit::{CallManager, RateLimiter};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let calls = Arc::new(CallManager::new(Arc::new(RateLimiter::new())));
/// let dispatcher = TaskDispatcher::new(DispatchConfig::default(), calls).unwrap();
///
/// let tasks = vec![Task::builder().id("t-1").provider_id("openai").build().unwrap()];
/// let op = Arc::new(FnOperation::new(|_task: Task| async { Ok(json!({"winner": "home"})) }));
///
/// let batch = dispatcher.run(tasks, DispatchStrategy::Parallel, op).await;
/// assert_eq!(batch.succeeded(), 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Debug)]
struct DispatcherInner {
    config: DispatchConfig,
    retry: RetryConfig,
    calls: Arc<CallManager>,
    cache: Option<Arc<ResultCache>>,
    fallbacks: Arc<FallbackRegistry>,
    observers: Vec<Arc<dyn CallObserver>>,
    global: Arc<Semaphore>,
    providers: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl TaskDispatcher {
    /// Create a dispatcher with default retry, no cache, an empty fallback
    /// registry, and the tracing observer.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: DispatchConfig, calls: Arc<CallManager>) -> Result<Self, ConfigError> {
        Self::builder(config, calls).build()
    }

    /// Start a builder.
    pub fn builder(config: DispatchConfig, calls: Arc<CallManager>) -> TaskDispatcherBuilder {
        TaskDispatcherBuilder {
            config,
            calls,
            retry: RetryConfig::default(),
            cache: None,
            fallbacks: None,
            observers: Vec::new(),
        }
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Shared call manager.
    pub fn calls(&self) -> &Arc<CallManager> {
        &self.inner.calls
    }

    /// Shared fallback registry.
    pub fn fallbacks(&self) -> &Arc<FallbackRegistry> {
        &self.inner.fallbacks
    }

    /// Shared result cache, if any.
    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.inner.cache.as_ref()
    }

    /// Free global slots.
    pub fn available_slots(&self) -> usize {
        self.inner.global.available_permits()
    }

    /// Run a batch of tasks and collect one outcome per task, in
    /// submission order.
    ///
    /// Dropping the returned future cancels every task still in flight
    /// and releases their slots.
    #[instrument(skip(self, tasks, op), fields(tasks = tasks.len()))]
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        strategy: DispatchStrategy,
        op: Arc<dyn TaskOperation>,
    ) -> BatchResult {
        let started = Instant::now();
        let usage = Arc::new(UsageTracker::default());
        let total = tasks.len();
        info!(%strategy, total, "Dispatching batch");

        let (outcomes, group_sizes) = match strategy {
            DispatchStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(total);
                for task in tasks {
                    outcomes.extend(self.run_concurrently(vec![task], &op, &usage).await);
                }
                (outcomes, vec![1; total])
            }
            DispatchStrategy::Parallel => {
                let outcomes = self.run_concurrently(tasks, &op, &usage).await;
                let sizes = if total == 0 { Vec::new() } else { vec![total] };
                (outcomes, sizes)
            }
            DispatchStrategy::Batch => self.run_in_chunks(tasks, &op, &usage).await,
            DispatchStrategy::Priority => self.run_by_priority(tasks, &op, &usage).await,
        };

        let duration = started.elapsed();
        let batch = BatchResult::new(
            outcomes,
            BatchMetadata::new(strategy, group_sizes, usage.snapshot(), duration),
        );

        let event = BatchEvent {
            strategy,
            total: batch.total(),
            succeeded: batch.succeeded(),
            degraded: batch.degraded(),
            failed: batch.failed(),
            duration,
        };
        for observer in &self.inner.observers {
            observer.on_batch(&event);
        }
        batch
    }

    async fn run_in_chunks(
        &self,
        tasks: Vec<Task>,
        op: &Arc<dyn TaskOperation>,
        usage: &Arc<UsageTracker>,
    ) -> (Vec<TaskOutcome>, Vec<usize>) {
        let size = (*self.inner.config.batch_size()).max(1);
        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut sizes = Vec::new();
        let mut remaining = tasks.into_iter().peekable();

        while remaining.peek().is_some() {
            let chunk: Vec<Task> = remaining.by_ref().take(size).collect();
            sizes.push(chunk.len());
            debug!(chunk = sizes.len(), size = chunk.len(), "Running chunk");
            outcomes.extend(self.run_concurrently(chunk, op, usage).await);

            if remaining.peek().is_some() {
                tokio::time::sleep(self.inner.config.batch_pause()).await;
            }
        }
        (outcomes, sizes)
    }

    async fn run_by_priority(
        &self,
        tasks: Vec<Task>,
        op: &Arc<dyn TaskOperation>,
        usage: &Arc<UsageTracker>,
    ) -> (Vec<TaskOutcome>, Vec<usize>) {
        // Highest priority first; submission order kept within a group.
        let mut groups: BTreeMap<Reverse<u8>, Vec<(usize, Task)>> = BTreeMap::new();
        for (index, task) in tasks.into_iter().enumerate() {
            groups
                .entry(Reverse(task.priority().value()))
                .or_default()
                .push((index, task));
        }

        let mut indexed = Vec::new();
        let mut sizes = Vec::with_capacity(groups.len());
        let group_count = groups.len();

        for (position, (priority, group)) in groups.into_iter().enumerate() {
            sizes.push(group.len());
            debug!(priority = priority.0, size = group.len(), "Running priority group");
            let (indices, group): (Vec<usize>, Vec<Task>) = group.into_iter().unzip();
            let outcomes = self.run_concurrently(group, op, usage).await;
            indexed.extend(indices.into_iter().zip(outcomes));

            if position + 1 < group_count {
                tokio::time::sleep(self.inner.config.group_pause()).await;
            }
        }

        indexed.sort_by_key(|(index, _)| *index);
        (indexed.into_iter().map(|(_, outcome)| outcome).collect(), sizes)
    }

    /// Spawn every task and wait for all of them.
    async fn run_concurrently(
        &self,
        tasks: Vec<Task>,
        op: &Arc<dyn TaskOperation>,
        usage: &Arc<UsageTracker>,
    ) -> Vec<TaskOutcome> {
        let mut submitted = Vec::with_capacity(tasks.len());
        let mut handles = AbortOnDrop(Vec::with_capacity(tasks.len()));

        for task in tasks {
            submitted.push(task.clone());
            let inner = Arc::clone(&self.inner);
            let op = Arc::clone(op);
            let usage = Arc::clone(usage);
            handles
                .0
                .push(tokio::spawn(async move { inner.dispatch(task, op, usage).await }));
        }

        let joined = join_all(handles.0.iter_mut()).await;

        submitted
            .into_iter()
            .zip(joined)
            .map(|(task, joined)| match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    let reason = if err.is_panic() { "task panicked" } else { "task cancelled" };
                    warn!(task_id = %task.id(), reason, "Task did not complete");
                    usage.fail(provider_of(task.provider_id()));
                    TaskOutcome::failed(
                        task,
                        CallError::new(CallErrorKind::Aborted(reason.to_string())),
                        0,
                        false,
                        Duration::ZERO,
                    )
                }
            })
            .collect()
    }
}

impl DispatcherInner {
    fn provider_slots(&self, provider: &str) -> Arc<Semaphore> {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            providers
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(*self.config.max_concurrent_per_provider()))),
        )
    }

    #[instrument(skip(self, task, op, usage), fields(task_id = %task.id(), provider = provider_of(task.provider_id())))]
    async fn dispatch(
        &self,
        task: Task,
        op: Arc<dyn TaskOperation>,
        usage: Arc<UsageTracker>,
    ) -> TaskOutcome {
        let provider = provider_of(task.provider_id()).to_string();
        usage.submit(&provider);

        let slots = match self.acquire(&provider).await {
            Ok(slots) => slots,
            Err(err) => {
                usage.fail(&provider);
                return TaskOutcome::failed(task, err, 0, false, Duration::ZERO);
            }
        };
        let _in_flight = usage.enter(&provider);
        let outcome = self.execute(task, op.as_ref()).await;
        drop(slots);

        if outcome.state() == &TaskState::Failed {
            usage.fail(&provider);
        }
        outcome
    }

    async fn acquire(&self, provider: &str) -> Result<Slots, CallError> {
        let closed = |_| CallError::new(CallErrorKind::Aborted("dispatcher shut down".to_string()));
        let global = Arc::clone(&self.global).acquire_owned().await.map_err(closed)?;
        let provider = self.provider_slots(provider).acquire_owned().await.map_err(closed)?;
        Ok(Slots {
            _global: global,
            _provider: provider,
        })
    }

    async fn execute(&self, task: Task, op: &dyn TaskOperation) -> TaskOutcome {
        let started = Instant::now();

        if let (Some(cache), Some(key)) = (&self.cache, task.cache_key())
            && let Some(value) = cache.get(key)
        {
            debug!(cache_key = %key, "Serving task from cache");
            return TaskOutcome::from_cache(task, value, started.elapsed());
        }

        let attempt = self
            .calls
            .execute_within(task.provider_id(), &self.retry, self.config.task_timeout(), || {
                op.invoke(&task)
            })
            .await;

        let event = CallEvent {
            task_id: task.id().clone(),
            provider: provider_of(task.provider_id()).to_string(),
            success: attempt.is_success(),
            attempts: attempt.attempts,
            rate_limited: attempt.rate_limited,
            duration: started.elapsed(),
            error_category: attempt.error().map(|e| e.category().to_string()),
        };
        for observer in &self.observers {
            observer.on_call(&event);
        }

        let attempts = attempt.attempts;
        let rate_limited = attempt.rate_limited;
        match attempt.into_result() {
            Ok(value) => {
                if let (Some(cache), Some(key)) = (&self.cache, task.cache_key()) {
                    cache.put_with_stale_copy(key, value.clone(), EntryType::Response);
                }
                TaskOutcome::live(task, value, attempts, rate_limited, started.elapsed())
            }
            Err(err) => self.recover(task, err, attempts, rate_limited, started).await,
        }
    }

    async fn recover(
        &self,
        task: Task,
        err: CallError,
        attempts: u32,
        rate_limited: bool,
        started: Instant,
    ) -> TaskOutcome {
        let mut context = ErrorContext::new(task.id().clone(), task.provider_id().clone(), attempts);
        if let Some(category) = task.result_categories().first() {
            context = context.with_result_category(category.clone());
        }
        if let Some(key) = task.cache_key() {
            context = context.with_cache_key(key.clone());
        }

        match self.fallbacks.recover(&context, &err).await {
            Ok(recovered) => {
                info!(strategy = %recovered.strategy, "Task degraded to fallback value");
                TaskOutcome::degraded(
                    task,
                    recovered.value,
                    recovered.strategy,
                    err,
                    attempts,
                    rate_limited,
                    started.elapsed(),
                )
            }
            Err(err) => {
                warn!(error = %err.kind, "Task failed");
                TaskOutcome::failed(task, err, attempts, rate_limited, started.elapsed())
            }
        }
    }
}

/// Builder for [`TaskDispatcher`].
#[derive(Debug)]
pub struct TaskDispatcherBuilder {
    config: DispatchConfig,
    calls: Arc<CallManager>,
    retry: RetryConfig,
    cache: Option<Arc<ResultCache>>,
    fallbacks: Option<Arc<FallbackRegistry>>,
    observers: Vec<Arc<dyn CallObserver>>,
}

impl TaskDispatcherBuilder {
    /// Retry configuration applied to every call.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Share a result cache.
    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a fallback registry.
    pub fn fallbacks(mut self, fallbacks: Arc<FallbackRegistry>) -> Self {
        self.fallbacks = Some(fallbacks);
        self
    }

    /// Add an observer. Without any, [`TracingObserver`] is used.
    pub fn observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch or retry configuration is invalid.
    pub fn build(self) -> Result<TaskDispatcher, ConfigError> {
        self.config.validate()?;
        self.retry.validate()?;

        let observers = if self.observers.is_empty() {
            vec![Arc::new(TracingObserver) as Arc<dyn CallObserver>]
        } else {
            self.observers
        };

        Ok(TaskDispatcher {
            inner: Arc::new(DispatcherInner {
                global: Arc::new(Semaphore::new(*self.config.max_concurrent_tasks())),
                config: self.config,
                retry: self.retry,
                calls: self.calls,
                cache: self.cache,
                fallbacks: self.fallbacks.unwrap_or_default(),
                observers,
                providers: Mutex::new(HashMap::new()),
            }),
        })
    }
}

/// Slots held while a task runs; released on drop.
struct Slots {
    _global: OwnedSemaphorePermit,
    _provider: OwnedSemaphorePermit,
}

/// Aborts spawned tasks when the batch future is dropped.
struct AbortOnDrop(Vec<JoinHandle<TaskOutcome>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

#[derive(Debug, Default)]
struct UsageTracker {
    providers: Mutex<BTreeMap<String, UsageCounters>>,
}

#[derive(Debug, Default)]
struct UsageCounters {
    usage: ProviderUsage,
    in_flight: usize,
}

impl UsageTracker {
    fn with<R>(&self, provider: &str, f: impl FnOnce(&mut UsageCounters) -> R) -> R {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        f(providers.entry(provider.to_string()).or_default())
    }

    fn submit(&self, provider: &str) {
        self.with(provider, |c| c.usage.tasks += 1);
    }

    fn fail(&self, provider: &str) {
        self.with(provider, |c| c.usage.failed += 1);
    }

    fn enter(self: &Arc<Self>, provider: &str) -> InFlight {
        self.with(provider, |c| {
            c.in_flight += 1;
            c.usage.peak_in_flight = c.usage.peak_in_flight.max(c.in_flight);
        });
        InFlight {
            tracker: Arc::clone(self),
            provider: provider.to_string(),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, ProviderUsage> {
        let providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        providers.iter().map(|(k, c)| (k.clone(), c.usage)).collect()
    }
}

struct InFlight {
    tracker: Arc<UsageTracker>,
    provider: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.tracker
            .with(&self.provider, |c| c.in_flight = c.in_flight.saturating_sub(1));
    }
}
