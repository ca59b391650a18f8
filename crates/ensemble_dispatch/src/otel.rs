//! OpenTelemetry metrics for dispatched calls.
//!
//! Instruments are created against the global meter provider, so they are
//! no-ops until the application installs one.

use crate::{BatchEvent, CallEvent, CallObserver};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::OnceLock;

static METRICS: OnceLock<DispatchMetrics> = OnceLock::new();

#[derive(Debug)]
struct DispatchMetrics {
    calls: Counter<u64>,
    errors: Counter<u64>,
    retries: Counter<u64>,
    rate_limited: Counter<u64>,
    call_duration: Histogram<f64>,
    tasks: Counter<u64>,
    batch_duration: Histogram<f64>,
}

impl DispatchMetrics {
    fn new() -> Self {
        let meter = global::meter("ensemble_dispatch");

        Self {
            calls: meter
                .u64_counter("ensemble.calls")
                .with_description("Logical provider calls")
                .build(),
            errors: meter
                .u64_counter("ensemble.call_errors")
                .with_description("Calls that failed after all attempts")
                .build(),
            retries: meter
                .u64_counter("ensemble.retries")
                .with_description("Retry attempts across all calls")
                .build(),
            rate_limited: meter
                .u64_counter("ensemble.rate_limited")
                .with_description("Calls that hit a rate limit")
                .build(),
            call_duration: meter
                .f64_histogram("ensemble.call_duration")
                .with_description("Call duration including retries")
                .with_unit("seconds")
                .build(),
            tasks: meter
                .u64_counter("ensemble.tasks")
                .with_description("Dispatched tasks by final state")
                .build(),
            batch_duration: meter
                .f64_histogram("ensemble.batch_duration")
                .with_description("Batch wall time")
                .with_unit("seconds")
                .build(),
        }
    }

    fn get() -> &'static Self {
        METRICS.get_or_init(Self::new)
    }
}

/// Records dispatcher events as OpenTelemetry metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtelObserver;

impl CallObserver for OtelObserver {
    fn on_call(&self, event: &CallEvent) {
        let metrics = DispatchMetrics::get();
        let labels = [KeyValue::new("provider", event.provider.clone())];

        metrics.calls.add(1, &labels);
        metrics
            .call_duration
            .record(event.duration.as_secs_f64(), &labels);
        if event.attempts > 1 {
            metrics
                .retries
                .add(u64::from(event.attempts - 1), &labels);
        }
        if event.rate_limited {
            metrics.rate_limited.add(1, &labels);
        }
        if !event.success {
            let category = event
                .error_category
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            metrics.errors.add(
                1,
                &[
                    KeyValue::new("provider", event.provider.clone()),
                    KeyValue::new("error_category", category),
                ],
            );
        }
    }

    fn on_batch(&self, event: &BatchEvent) {
        let metrics = DispatchMetrics::get();
        let strategy = KeyValue::new("strategy", event.strategy.to_string());

        for (state, count) in [
            ("succeeded", event.succeeded),
            ("degraded", event.degraded),
            ("failed", event.failed),
        ] {
            metrics.tasks.add(
                count as u64,
                &[strategy.clone(), KeyValue::new("state", state)],
            );
        }
        metrics
            .batch_duration
            .record(event.duration.as_secs_f64(), &[strategy]);
    }
}
