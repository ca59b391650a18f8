//! The caller-supplied unit of work.

use async_trait::async_trait;
use ensemble_core::Task;
use ensemble_error::CallError;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;

/// Invokes a provider for one task.
///
/// Implementations must be safe to retry: the dispatcher may call
/// `invoke` several times for the same task.
#[async_trait]
pub trait TaskOperation: Send + Sync {
    /// Run the task once.
    async fn invoke(&self, task: &Task) -> Result<JsonValue, CallError>;
}

/// Operation backed by an async closure taking an owned task.
///
/// ```
/// use ensemble_dispatch::FnOperation;
/// use serde_json::json;
///
/// let op = FnOperation::new(|task: ensemble_core::Task| async move {
///     Ok(json!({"echo": task.id()}))
/// });
/// # let _ = op;
/// ```
pub struct FnOperation<F> {
    f: F,
}

impl<F, Fut> FnOperation<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, CallError>> + Send,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> TaskOperation for FnOperation<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue, CallError>> + Send,
{
    async fn invoke(&self, task: &Task) -> Result<JsonValue, CallError> {
        (self.f)(task.clone()).await
    }
}
