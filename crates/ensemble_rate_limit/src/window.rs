//! Sliding-window request counter.

use crate::AdmissionControl;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Admits at most `max_requests` within any trailing `window`.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    max_requests: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            timestamps: VecDeque::with_capacity(max_requests.max(1)),
        }
    }

    /// Requests recorded inside the current window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.timestamps.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl AdmissionControl for SlidingWindow {
    fn try_acquire(&mut self, n: u32, now: Instant) -> bool {
        self.evict(now);
        let n = n as usize;
        if self.timestamps.len() + n <= self.max_requests {
            self.timestamps.extend(std::iter::repeat_n(now, n));
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self, n: u32, now: Instant) -> Duration {
        self.evict(now);
        let n = n as usize;
        if n > self.max_requests {
            return Duration::MAX;
        }
        let overflow = (self.timestamps.len() + n).saturating_sub(self.max_requests);
        if overflow == 0 {
            return Duration::ZERO;
        }
        // The window frees up once the `overflow`-th oldest entry ages out.
        self.timestamps
            .get(overflow - 1)
            .map(|ts| (*ts + self.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn available(&mut self, now: Instant) -> f64 {
        self.evict(now);
        self.max_requests.saturating_sub(self.timestamps.len()) as f64
    }

    fn capacity(&self) -> f64 {
        self.max_requests as f64
    }
}
