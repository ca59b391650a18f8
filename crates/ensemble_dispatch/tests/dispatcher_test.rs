//! Tests for concurrent dispatch, isolation, and scheduling strategies.

use async_trait::async_trait;
use ensemble_cache::ResultCache;
use ensemble_core::{Task, TaskPriority, TaskState, provider_of};
use ensemble_dispatch::{
    BatchEvent, CallEvent, CallObserver, DispatchConfig, DispatchStrategy, FnOperation,
    TaskDispatcher, TaskOperation,
};
use ensemble_error::{CallError, CallErrorKind};
use ensemble_rate_limit::{CallManager, RateLimiter, RetryConfig};
use ensemble_recovery::{FallbackRegistry, StaticFallback};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn calls() -> Arc<CallManager> {
    Arc::new(CallManager::new(Arc::new(RateLimiter::new())))
}

fn task(id: &str, provider: &str) -> Task {
    Task::builder().id(id).provider_id(provider).build().unwrap()
}

fn no_jitter(max_retries: u32) -> RetryConfig {
    RetryConfig::builder()
        .max_retries(max_retries)
        .base_delay_ms(100)
        .jitter(false)
        .build()
        .unwrap()
}

/// Tracks in-flight calls per provider and overall.
#[derive(Debug, Default)]
struct ConcurrencyProbe {
    state: Mutex<ProbeState>,
    started: Mutex<Vec<String>>,
    hold: Duration,
}

#[derive(Debug, Default)]
struct ProbeState {
    in_flight: HashMap<String, usize>,
    peak: HashMap<String, usize>,
    total: usize,
    peak_total: usize,
}

impl ConcurrencyProbe {
    fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    fn peak(&self, provider: &str) -> usize {
        self.state.lock().unwrap().peak.get(provider).copied().unwrap_or(0)
    }

    fn peak_total(&self) -> usize {
        self.state.lock().unwrap().peak_total
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskOperation for ConcurrencyProbe {
    async fn invoke(&self, task: &Task) -> Result<JsonValue, CallError> {
        let provider = provider_of(task.provider_id()).to_string();
        self.started.lock().unwrap().push(task.id().clone());
        {
            let mut state = self.state.lock().unwrap();
            let current = state.in_flight.entry(provider.clone()).or_default();
            *current += 1;
            let current = *current;
            let peak = state.peak.entry(provider.clone()).or_default();
            *peak = (*peak).max(current);
            state.total += 1;
            state.peak_total = state.peak_total.max(state.total);
        }

        tokio::time::sleep(self.hold).await;

        let mut state = self.state.lock().unwrap();
        *state.in_flight.entry(provider).or_default() -= 1;
        state.total -= 1;
        Ok(json!({"task": task.id()}))
    }
}

#[derive(Debug, Default)]
struct RecordingObserver {
    calls: Mutex<Vec<CallEvent>>,
    batches: Mutex<Vec<BatchEvent>>,
}

impl CallObserver for RecordingObserver {
    fn on_call(&self, event: &CallEvent) {
        self.calls.lock().unwrap().push(event.clone());
    }

    fn on_batch(&self, event: &BatchEvent) {
        self.batches.lock().unwrap().push(event.clone());
    }
}

#[tokio::test(start_paused = true)]
async fn test_per_provider_cap_is_respected() {
    let config = DispatchConfig::default().with_limits(10, 3);
    let dispatcher = TaskDispatcher::new(config, calls()).unwrap();
    let probe = Arc::new(ConcurrencyProbe::holding(Duration::from_millis(50)));

    let tasks: Vec<Task> = (0..50)
        .map(|i| {
            let provider = if i % 2 == 0 { "openai/gpt-4o" } else { "anthropic/claude" };
            task(&format!("t-{}", i), provider)
        })
        .collect();

    let batch = dispatcher
        .run(tasks, DispatchStrategy::Parallel, probe.clone())
        .await;

    assert_eq!(batch.total(), 50);
    assert_eq!(batch.succeeded(), 50);
    assert!(probe.peak("openai") <= 3);
    assert!(probe.peak("anthropic") <= 3);
    assert_eq!(probe.peak("openai"), 3);
    assert!(probe.peak_total() <= 6);

    let usage = batch.metadata().provider_utilization();
    assert_eq!(usage["openai"].tasks, 25);
    assert_eq!(usage["anthropic"].tasks, 25);
    assert!(usage["openai"].peak_in_flight <= 3);
    assert_eq!(dispatcher.available_slots(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_global_cap_is_respected() {
    let config = DispatchConfig::default().with_limits(4, 3);
    let dispatcher = TaskDispatcher::new(config, calls()).unwrap();
    let probe = Arc::new(ConcurrencyProbe::holding(Duration::from_millis(20)));

    let tasks: Vec<Task> = (0..30)
        .map(|i| task(&format!("t-{}", i), &format!("provider-{}", i % 5)))
        .collect();

    let batch = dispatcher
        .run(tasks, DispatchStrategy::Parallel, probe.clone())
        .await;

    assert_eq!(batch.succeeded(), 30);
    assert_eq!(probe.peak_total(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_one_failure_does_not_affect_siblings() {
    let dispatcher = TaskDispatcher::new(DispatchConfig::default(), calls()).unwrap();
    let op = Arc::new(FnOperation::new(|task: Task| async move {
        if task.id() == "t-3" {
            Err(CallError::new(CallErrorKind::Validation("team missing".into())))
        } else {
            Ok(json!({"winner": "home"}))
        }
    }));

    let tasks = (1..=4).map(|i| task(&format!("t-{}", i), "openai")).collect();
    let batch = dispatcher.run(tasks, DispatchStrategy::Parallel, op).await;

    assert_eq!(batch.succeeded(), 3);
    assert_eq!(batch.failed(), 1);
    assert_eq!(batch.degraded(), 0);
    assert!((batch.success_rate() - 0.75).abs() < 1e-9);

    let failed = batch.outcome("t-3").unwrap();
    assert_eq!(failed.state(), &TaskState::Failed);
    assert_eq!(failed.attempts(), &1);
    assert!(matches!(
        failed.error().as_ref().map(|e| e.kind()),
        Some(CallErrorKind::Validation(_))
    ));

    let ids: Vec<&str> = batch.outcomes().iter().map(|o| o.task().id().as_str()).collect();
    assert_eq!(ids, vec!["t-1", "t-2", "t-3", "t-4"]);
    assert_eq!(batch.metadata().provider_utilization()["openai"].failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_task_is_isolated() {
    let dispatcher = TaskDispatcher::new(DispatchConfig::default().with_limits(2, 1), calls()).unwrap();
    let op = Arc::new(FnOperation::new(|task: Task| async move {
        if task.id() == "boom" {
            panic!("operation blew up");
        }
        Ok(json!(true))
    }));

    let tasks = vec![task("a", "p"), task("boom", "p"), task("c", "p")];
    let batch = dispatcher.run(tasks, DispatchStrategy::Parallel, op).await;

    assert_eq!(batch.succeeded(), 2);
    let boom = batch.outcome("boom").unwrap();
    assert_eq!(boom.state(), &TaskState::Failed);
    assert!(matches!(
        boom.error().as_ref().map(|e| e.kind()),
        Some(CallErrorKind::Aborted(_))
    ));
    // The panicking task released its provider slot.
    assert_eq!(dispatcher.available_slots(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_retried() {
    let dispatcher = TaskDispatcher::builder(DispatchConfig::default(), calls())
        .retry(no_jitter(3))
        .build()
        .unwrap();
    let counter = Arc::new(AtomicU32::new(0));
    let seen = counter.clone();
    let op = Arc::new(FnOperation::new(move |_task: Task| {
        let seen = seen.clone();
        async move {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CallError::new(CallErrorKind::Network("connection reset".into())))
            } else {
                Ok(json!("ok"))
            }
        }
    }));

    let batch = dispatcher
        .run(vec![task("t-1", "openai")], DispatchStrategy::Parallel, op)
        .await;

    let outcome = batch.outcome("t-1").unwrap();
    assert_eq!(outcome.state(), &TaskState::Succeeded);
    assert_eq!(outcome.attempts(), &2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_runs_one_task_at_a_time() {
    let dispatcher = TaskDispatcher::new(DispatchConfig::default(), calls()).unwrap();
    let probe = Arc::new(ConcurrencyProbe::holding(Duration::from_millis(10)));

    let tasks = (0..5).map(|i| task(&format!("t-{}", i), &format!("p-{}", i))).collect();
    let batch = dispatcher
        .run(tasks, DispatchStrategy::Sequential, probe.clone())
        .await;

    assert_eq!(batch.succeeded(), 5);
    assert_eq!(probe.peak_total(), 1);
    assert_eq!(batch.metadata().group_sizes(), &vec![1, 1, 1, 1, 1]);
    assert_eq!(probe.started(), vec!["t-0", "t-1", "t-2", "t-3", "t-4"]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_strategy_pauses_between_chunks() {
    let config = DispatchConfig::default().with_batching(2, 500);
    let dispatcher = TaskDispatcher::new(config, calls()).unwrap();
    let probe = Arc::new(ConcurrencyProbe::holding(Duration::ZERO));

    let tasks = (0..5).map(|i| task(&format!("t-{}", i), "openai")).collect();
    let batch = dispatcher
        .run(tasks, DispatchStrategy::Batch, probe.clone())
        .await;

    assert_eq!(batch.succeeded(), 5);
    assert_eq!(batch.metadata().group_sizes(), &vec![2, 2, 1]);
    assert!(*batch.metadata().duration() >= Duration::from_millis(1_000));
    assert!(probe.peak_total() <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_priority_groups_run_highest_first() {
    let config = DispatchConfig::default().with_group_pause_ms(100);
    let dispatcher = TaskDispatcher::new(config, calls()).unwrap();
    let probe = Arc::new(ConcurrencyProbe::holding(Duration::from_millis(5)));

    let prioritized = |id: &str, priority: u8| {
        Task::builder()
            .id(id)
            .provider_id("openai")
            .priority(TaskPriority::clamped(priority))
            .build()
            .unwrap()
    };
    let tasks = vec![
        prioritized("low", 1),
        prioritized("high", 9),
        prioritized("mid", 5),
        prioritized("high-2", 9),
    ];

    let batch = dispatcher
        .run(tasks, DispatchStrategy::Priority, probe.clone())
        .await;

    let started = probe.started();
    assert_eq!(&started[..2], &["high".to_string(), "high-2".to_string()]);
    assert_eq!(&started[2..], &["mid".to_string(), "low".to_string()]);
    assert_eq!(batch.metadata().group_sizes(), &vec![2, 1, 1]);

    let ids: Vec<&str> = batch.outcomes().iter().map(|o| o.task().id().as_str()).collect();
    assert_eq!(ids, vec!["low", "high", "mid", "high-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_the_call() {
    let cache = Arc::new(ResultCache::default());
    let dispatcher = TaskDispatcher::builder(DispatchConfig::default(), calls())
        .cache(cache.clone())
        .build()
        .unwrap();
    let invocations = Arc::new(AtomicU32::new(0));
    let seen = invocations.clone();
    let op: Arc<dyn TaskOperation> = Arc::new(FnOperation::new(move |_task: Task| {
        seen.fetch_add(1, Ordering::SeqCst);
        async { Ok(json!({"winner": "away"})) }
    }));

    let cached_task = || {
        Task::builder()
            .id("t-1")
            .provider_id("openai")
            .cache_key("response:abc")
            .build()
            .unwrap()
    };

    let first = dispatcher
        .run(vec![cached_task()], DispatchStrategy::Parallel, op.clone())
        .await;
    assert!(!*first.outcomes()[0].cached());

    let second = dispatcher
        .run(vec![cached_task()], DispatchStrategy::Parallel, op)
        .await;
    let outcome = &second.outcomes()[0];
    assert!(*outcome.cached());
    assert_eq!(outcome.attempts(), &0);
    assert_eq!(outcome.value(), &Some(json!({"winner": "away"})));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_routes_to_fallback() {
    let fallbacks = Arc::new(FallbackRegistry::default());
    fallbacks.register(Arc::new(StaticFallback::new("neutral", json!({"winner": "unknown"}))));

    let config = DispatchConfig::default().with_task_timeout_secs(1);
    let dispatcher = TaskDispatcher::builder(config, calls())
        .fallbacks(fallbacks.clone())
        .build()
        .unwrap();
    let op = Arc::new(FnOperation::new(|_task: Task| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!("too late"))
    }));

    let batch = dispatcher
        .run(vec![task("slow", "openai")], DispatchStrategy::Parallel, op)
        .await;

    let outcome = batch.outcome("slow").unwrap();
    assert_eq!(outcome.state(), &TaskState::Degraded);
    assert_eq!(outcome.fallback().as_deref(), Some("neutral"));
    assert_eq!(outcome.value(), &Some(json!({"winner": "unknown"})));
    assert!(matches!(
        outcome.error().as_ref().map(|e| e.kind()),
        Some(CallErrorKind::DeadlineExceeded(1_000))
    ));
    assert!(*outcome.duration() < Duration::from_secs(2));
    assert_eq!(batch.degraded(), 1);
    assert_eq!(fallbacks.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_skips_fallback() {
    let fallbacks = Arc::new(FallbackRegistry::default());
    fallbacks.register(Arc::new(StaticFallback::new("neutral", json!(null))));
    let dispatcher = TaskDispatcher::builder(DispatchConfig::default(), calls())
        .fallbacks(fallbacks)
        .build()
        .unwrap();
    let op = Arc::new(FnOperation::new(|_task: Task| async {
        Err(CallError::new(CallErrorKind::Authentication("bad key".into())))
    }));

    let batch = dispatcher
        .run(vec![task("t-1", "openai")], DispatchStrategy::Parallel, op)
        .await;

    assert_eq!(batch.failed(), 1);
    assert!(batch.outcomes()[0].fallback().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_observers_receive_call_and_batch_events() {
    let observer = Arc::new(RecordingObserver::default());
    let dispatcher = TaskDispatcher::builder(DispatchConfig::default(), calls())
        .observer(observer.clone())
        .build()
        .unwrap();
    let op = Arc::new(FnOperation::new(|task: Task| async move {
        if task.id() == "bad" {
            Err(CallError::new(CallErrorKind::Parse("not json".into())))
        } else {
            Ok(json!(1))
        }
    }));

    let tasks = vec![task("a", "openai"), task("bad", "gemini/flash"), task("c", "openai")];
    dispatcher.run(tasks, DispatchStrategy::Parallel, op).await;

    let calls = observer.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    let bad = calls.iter().find(|e| e.task_id == "bad").unwrap();
    assert!(!bad.success);
    assert_eq!(bad.provider, "gemini");
    assert_eq!(bad.error_category.as_deref(), Some("response_parse_failure"));

    let batches = observer.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].total, 3);
    assert_eq!(batches[0].failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_batch_releases_slots() {
    let dispatcher = TaskDispatcher::new(DispatchConfig::default().with_limits(3, 3), calls()).unwrap();
    let op = Arc::new(FnOperation::new(|_task: Task| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!(null))
    }));

    let tasks = (0..3).map(|i| task(&format!("t-{}", i), "openai")).collect();
    let run = dispatcher.run(tasks, DispatchStrategy::Parallel, op);
    let timed_out = tokio::time::timeout(Duration::from_secs(1), run).await;
    assert!(timed_out.is_err());

    // Aborted tasks drop their permits once the runtime polls them.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dispatcher.available_slots(), 3);
}

#[tokio::test]
async fn test_empty_batch() {
    let dispatcher = TaskDispatcher::new(DispatchConfig::default(), calls()).unwrap();
    let op = Arc::new(FnOperation::new(|_task: Task| async { Ok(json!(null)) }));

    let batch = dispatcher.run(Vec::new(), DispatchStrategy::Batch, op).await;
    assert_eq!(batch.total(), 0);
    assert_eq!(batch.success_rate(), 1.0);
    assert!(batch.metadata().group_sizes().is_empty());
}
