//! Lazily refilled token bucket.

use crate::{AdmissionControl, RateBudget};
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket owned by a single provider.
///
/// Tokens are refilled on every check from the elapsed time since the
/// previous check and never exceed the budget's capacity.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    budget: RateBudget,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket filled to the budget's initial level.
    pub fn new(budget: RateBudget) -> Self {
        Self::starting_at(budget, Instant::now())
    }

    /// Create a bucket whose refill clock starts at `now`.
    pub fn starting_at(budget: RateBudget, now: Instant) -> Self {
        Self {
            tokens: budget.initial_tokens(),
            budget,
            last_refill: now,
        }
    }

    /// Budget this bucket enforces.
    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    /// Tokens held after the last refill, without refilling.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        // Clock readings from before the last refill add nothing.
        let elapsed = now.saturating_duration_since(self.last_refill);
        let added = elapsed.as_secs_f64() * self.budget.refill_per_second.max(0.0);
        self.tokens = (self.tokens + added).min(self.budget.capacity).max(0.0);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

impl AdmissionControl for TokenBucket {
    fn try_acquire(&mut self, n: u32, now: Instant) -> bool {
        self.refill(now);
        let needed = f64::from(n);
        if self.tokens >= needed {
            self.tokens -= needed;
            true
        } else {
            false
        }
    }

    fn wait_time(&mut self, n: u32, now: Instant) -> Duration {
        self.refill(now);
        let needed = f64::from(n);
        if self.tokens >= needed {
            return Duration::ZERO;
        }
        if needed > self.budget.capacity || self.budget.refill_per_second <= 0.0 {
            return Duration::MAX;
        }
        Duration::from_secs_f64((needed - self.tokens) / self.budget.refill_per_second)
    }

    fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    fn capacity(&self) -> f64 {
        self.budget.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refill_is_capped() {
        let start = Instant::now();
        let mut bucket = TokenBucket::starting_at(RateBudget::new(3.0, 10.0), start);
        assert!(bucket.try_acquire(3, start));
        assert_eq!(bucket.available(start + Duration::from_secs(60)), 3.0);
    }

    #[test]
    fn test_partial_burst_start() {
        let start = Instant::now();
        let budget = RateBudget::new(10.0, 1.0).with_burst(2.0);
        let mut bucket = TokenBucket::starting_at(budget, start);
        assert!(bucket.try_acquire(2, start));
        assert!(!bucket.try_acquire(1, start));
        assert_eq!(bucket.wait_time(1, start), Duration::from_secs(1));
    }

    #[test]
    fn test_oversized_request_never_fits() {
        let start = Instant::now();
        let mut bucket = TokenBucket::starting_at(RateBudget::new(2.0, 1.0), start);
        assert_eq!(bucket.wait_time(5, start), Duration::MAX);
    }
}
