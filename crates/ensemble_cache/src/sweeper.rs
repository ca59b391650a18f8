//! Background removal of expired entries.

use crate::ResultCache;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a background sweep task.
///
/// The task holds only a weak reference to the cache and stops when the
/// cache is dropped. Dropping the handle aborts the task.
#[derive(Debug)]
pub struct CacheSweeper {
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawn a sweeper on the current Tokio runtime.
    pub fn spawn<V>(cache: &Arc<ResultCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + 'static,
    {
        let weak: Weak<ResultCache<V>> = Arc::downgrade(cache);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    debug!("Cache dropped, stopping sweeper");
                    break;
                };
                let removed = cache.cleanup_expired();
                debug!(removed, "Cache sweep complete");
            }
        });
        Self { handle }
    }

    /// Whether the sweep task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<V> ResultCache<V>
where
    V: Clone + Send + 'static,
{
    /// Spawn a sweeper at the configured interval.
    pub fn spawn_sweeper(self: &Arc<Self>) -> CacheSweeper {
        CacheSweeper::spawn(self, self.config().sweep_interval())
    }
}
