//! Concurrent dispatch of provider tasks.
//!
//! [`TaskDispatcher`] runs a batch of [`Task`](ensemble_core::Task)s under a
//! global concurrency cap and a per-provider cap, routing every call through
//! rate limiting, retry, caching, and fallback recovery. Results come back
//! as a [`BatchResult`] with one [`TaskOutcome`] per task.
//!
//! Enable the `otel` feature for [`OtelObserver`], which records call and
//! batch metrics through OpenTelemetry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dispatcher;
mod observer;
mod operation;
#[cfg(feature = "otel")]
mod otel;
mod report;

pub use config::{DispatchConfig, DispatchStrategy};
pub use dispatcher::{TaskDispatcher, TaskDispatcherBuilder};
pub use observer::{BatchEvent, CallEvent, CallObserver, TracingObserver};
pub use operation::{FnOperation, TaskOperation};
#[cfg(feature = "otel")]
pub use otel::OtelObserver;
pub use report::{BatchMetadata, BatchResult, ProviderUsage, TaskOutcome};
