//! Lifecycle notifications.
//!
//! Events go out over tokio broadcast channels. Sending never blocks and is
//! silently dropped when nobody is subscribed; slow subscribers observe
//! `RecvError::Lagged` instead of slowing the scheduler down.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::job::{AttemptFailure, JobError, JobId, JobPriority, JobStatus};
use super::sequencer::SubItemStatus;

/// Why a job left the scheduler without finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Cancelled by id
    Manual,
    /// Pending or retry-scheduled job dropped by a clear
    Cleared,
    /// Active job interrupted by a clear that did not keep active jobs
    QueueCleared,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Cleared => "cleared",
            Self::QueueCleared => "queue_cleared",
        }
    }
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Job accepted into the priority queue
    Added {
        job_id: JobId,
        priority: JobPriority,
        metadata: serde_json::Value,
    },
    /// Job admitted and an attempt started
    Started {
        job_id: JobId,
        attempt: u32,
        max_attempts: u32,
        metadata: serde_json::Value,
    },
    /// Job finished successfully
    Completed {
        job_id: JobId,
        attempt: u32,
        elapsed_ms: u64,
        result: serde_json::Value,
        metadata: serde_json::Value,
    },
    /// Attempt failed and the job will be re-admitted after `delay_ms`
    RetryScheduled {
        job_id: JobId,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        error: JobError,
        metadata: serde_json::Value,
    },
    /// Job failed for good
    Failed {
        job_id: JobId,
        attempts: u32,
        error: JobError,
        history: Vec<AttemptFailure>,
        metadata: serde_json::Value,
    },
    /// Job was cancelled or cleared
    Removed {
        job_id: JobId,
        reason: RemovalReason,
        previous_status: JobStatus,
        metadata: serde_json::Value,
    },
    /// No pending, active or retry-scheduled jobs remain
    QueueEmpty,
    Paused,
    Resumed,
}

impl JobEvent {
    /// Job the event refers to, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Added { job_id, .. }
            | Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::RetryScheduled { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Removed { job_id, .. } => Some(job_id),
            Self::QueueEmpty | Self::Paused | Self::Resumed => None,
        }
    }

    /// Short event name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Failed { .. } => "failed",
            Self::Removed { .. } => "removed",
            Self::QueueEmpty => "queue_empty",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
        }
    }
}

/// Events emitted while a composite job works through its sub-items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SequenceEvent {
    ItemStarted {
        composite_id: JobId,
        index: usize,
        item_id: String,
        attempt: u32,
    },
    ItemRetryScheduled {
        composite_id: JobId,
        index: usize,
        item_id: String,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        error: JobError,
    },
    /// Sub-item reached a terminal sub-status
    ItemCompleted {
        composite_id: JobId,
        index: usize,
        item_id: String,
        status: SubItemStatus,
        attempts: u32,
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<JobError>,
    },
    /// Every sub-item has been processed
    Completed {
        composite_id: JobId,
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}

/// Fire-and-forget send.
pub(crate) fn publish<T: Clone>(sender: &broadcast::Sender<T>, event: T) {
    let _ = sender.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::Removed {
            job_id: JobId::new("track-1"),
            reason: RemovalReason::QueueCleared,
            previous_status: JobStatus::Active,
            metadata: json!({"url": "https://example.com/a"}),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "removed");
        assert_eq!(value["reason"], "queue_cleared");
        assert_eq!(value["previous_status"], "active");
        assert_eq!(value["metadata"]["url"], "https://example.com/a");

        let back: JobEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_accessors() {
        let event = JobEvent::Started {
            job_id: JobId::new("a"),
            attempt: 1,
            max_attempts: 3,
            metadata: serde_json::Value::Null,
        };
        assert_eq!(event.job_id().map(JobId::as_str), Some("a"));
        assert_eq!(event.name(), "started");
        assert!(JobEvent::QueueEmpty.job_id().is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let (sender, receiver) = broadcast::channel::<JobEvent>(4);
        drop(receiver);
        publish(&sender, JobEvent::Paused);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let (sender, mut receiver) = broadcast::channel::<JobEvent>(4);
        publish(&sender, JobEvent::Resumed);
        assert_eq!(receiver.recv().await.unwrap(), JobEvent::Resumed);
    }
}
