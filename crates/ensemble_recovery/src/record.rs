//! Error records and bounded history.

use crate::Severity;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use ensemble_error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Where a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Getters)]
pub struct ErrorContext {
    task_id: String,
    provider_id: String,
    attempt: u32,
    /// Result category the failed task was producing, if any.
    result_category: Option<String>,
    /// Cache key of the failed task, if any.
    cache_key: Option<String>,
}

impl ErrorContext {
    /// Context for attempt `attempt` of a task.
    pub fn new(task_id: impl Into<String>, provider_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            provider_id: provider_id.into(),
            attempt,
            result_category: None,
            cache_key: None,
        }
    }

    /// Sets the result category.
    pub fn with_result_category(mut self, category: impl Into<String>) -> Self {
        self.result_category = Some(category.into());
        self
    }

    /// Sets the cache key.
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}

/// Immutable record of one unrecoverable failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ErrorRecord {
    id: Uuid,
    category: ErrorCategory,
    severity: Severity,
    message: String,
    context: ErrorContext,
    timestamp: DateTime<Utc>,
    fallback_applied: Option<String>,
}

impl ErrorRecord {
    /// Create a record stamped now.
    pub fn new(
        category: ErrorCategory,
        severity: Severity,
        message: impl Into<String>,
        context: ErrorContext,
        fallback_applied: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            severity,
            message: message.into(),
            context,
            timestamp: Utc::now(),
            fallback_applied,
        }
    }
}

/// Default number of records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bounded, thread-safe ring of error records; oldest records drop first.
#[derive(Debug)]
pub struct ErrorHistory {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHistory {
    /// History keeping at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, dropping the oldest if full.
    pub fn record(&self, record: ErrorRecord) {
        let mut records = self.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Up to `n` most recent records, newest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorRecord> {
        self.lock().iter().rev().take(n).cloned().collect()
    }

    /// Record counts per category.
    pub fn count_by_category(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut counts = BTreeMap::new();
        for record in self.lock().iter() {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        counts
    }

    /// Record counts per severity.
    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for record in self.lock().iter() {
            *counts.entry(record.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Records held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
