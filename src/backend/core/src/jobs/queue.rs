//! In-memory priority queue of pending jobs.
//!
//! Jobs are kept sorted by `(priority, sequence)`: lower band first, then
//! admission order. Position 0 is the next job to dispatch.

use std::collections::BTreeMap;

use super::job::{JobId, JobRecord};

/// Ordered collection of pending jobs.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    entries: Vec<JobRecord>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job at its ordered position.
    ///
    /// A job goes after every entry with an equal or smaller key, so equal keys
    /// keep insertion order.
    pub fn enqueue(&mut self, job: JobRecord) {
        let key = job.admission_key();
        let index = self
            .entries
            .partition_point(|entry| entry.admission_key() <= key);
        self.entries.insert(index, job);
    }

    /// Take up to `n` jobs from the front.
    pub fn dequeue_up_to(&mut self, n: usize) -> Vec<JobRecord> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }

    /// Remove a job by id, returning it if it was queued.
    pub fn remove(&mut self, id: &JobId) -> Option<JobRecord> {
        let index = self.entries.iter().position(|entry| &entry.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Zero-based position in dispatch order.
    pub fn position_of(&self, id: &JobId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.position_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued jobs per priority band. Empty bands are omitted.
    pub fn counts_by_priority(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.priority.value()).or_insert(0) += 1;
        }
        counts
    }

    /// Remove every queued job, in dispatch order.
    pub fn drain(&mut self) -> Vec<JobRecord> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{JobContext, JobError, JobPriority, JobSpec};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn record(id: &str, priority: i64, sequence: u64) -> JobRecord {
        let spec = JobSpec::new(id, |_ctx: JobContext| async {
            Ok::<_, JobError>(serde_json::Value::Null)
        });
        JobRecord::new(
            spec,
            JobPriority::clamped(priority, 3),
            Duration::from_secs(1),
            sequence,
        )
    }

    fn drain_ids(queue: &mut PriorityQueue) -> Vec<String> {
        queue
            .drain()
            .into_iter()
            .map(|entry| entry.id.to_string())
            .collect()
    }

    #[test]
    fn test_orders_by_priority_then_admission() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(record("b", 2, 1));
        queue.enqueue(record("c", 1, 2));
        queue.enqueue(record("a", 1, 0));

        assert_eq!(drain_ids(&mut queue), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(record("first", 0, 5));
        queue.enqueue(record("second", 0, 5));

        assert_eq!(drain_ids(&mut queue), vec!["first", "second"]);
    }

    // ========================================================================
    // Admission order ignores wall-clock time
    // ========================================================================

    #[test]
    fn test_sequence_wins_over_added_at() {
        let mut queue = PriorityQueue::new();
        let early = record("early", 1, 0);
        let mut late = record("late", 1, 1);
        // A clock step back gives the later admission an older timestamp.
        late.added_at = early.added_at - ChronoDuration::seconds(30);

        queue.enqueue(late);
        queue.enqueue(early);

        assert_eq!(drain_ids(&mut queue), vec!["early", "late"]);
    }

    #[test]
    fn test_dequeue_up_to() {
        let mut queue = PriorityQueue::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            queue.enqueue(record(id, 0, i as u64));
        }

        let taken = queue.dequeue_up_to(2);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].id.as_str(), "a");
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.dequeue_up_to(10).len(), 1);
        assert!(queue.dequeue_up_to(1).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_and_position() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(record("a", 0, 0));
        queue.enqueue(record("b", 0, 1));
        queue.enqueue(record("c", 0, 2));

        assert_eq!(queue.position_of(&JobId::new("c")), Some(2));
        assert!(queue.remove(&JobId::new("b")).is_some());
        assert!(queue.remove(&JobId::new("b")).is_none());
        assert_eq!(queue.position_of(&JobId::new("c")), Some(1));
        assert!(!queue.contains(&JobId::new("b")));
        assert!(queue.contains(&JobId::new("a")));
    }

    #[test]
    fn test_counts_by_priority() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(record("a", 0, 0));
        queue.enqueue(record("b", 2, 1));
        queue.enqueue(record("c", 2, 2));

        let counts = queue.counts_by_priority();
        assert_eq!(counts.get(&0), Some(&1));
        assert_eq!(counts.get(&1), None);
        assert_eq!(counts.get(&2), Some(&2));

        assert_eq!(queue.drain().len(), 3);
        assert!(queue.counts_by_priority().is_empty());
    }
}
