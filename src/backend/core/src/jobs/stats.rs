//! Cumulative counters and point-in-time status snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::job::JobId;

/// Cumulative scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub added: u64,
    pub completed: u64,
    pub failed: u64,
    /// Retry cycles scheduled
    pub retried: u64,
    pub removed: u64,
    /// Mean elapsed time of the successful attempt of completed jobs
    pub avg_processing_time_ms: f64,
}

impl SchedulerStats {
    /// Count a completion and fold its elapsed time into the running mean.
    pub fn record_completed(&mut self, elapsed: Duration) {
        self.completed += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.avg_processing_time_ms += (sample - self.avg_processing_time_ms) / self.completed as f64;
    }

    pub fn record_added(&mut self) {
        self.added += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_retried(&mut self) {
        self.retried += 1;
    }

    pub fn record_removed(&mut self) {
        self.removed += 1;
    }
}

/// Read-only view of the scheduler at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub queue_length: usize,
    /// Active job ids in admission order
    pub active_ids: Vec<JobId>,
    pub retry_scheduled_ids: Vec<JobId>,
    pub is_paused: bool,
    /// Pending jobs per priority band
    pub counts_by_priority: BTreeMap<u8, usize>,
    pub max_concurrent: usize,
    #[serde(flatten)]
    pub stats: SchedulerStats,
}

impl SchedulerStatus {
    pub fn active_count(&self) -> usize {
        self.active_ids.len()
    }

    /// True when nothing is pending, running or waiting to retry.
    pub fn is_idle(&self) -> bool {
        self.queue_length == 0 && self.active_ids.is_empty() && self.retry_scheduled_ids.is_empty()
    }
}
