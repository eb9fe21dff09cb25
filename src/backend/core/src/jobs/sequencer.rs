//! Serial execution of composite jobs.
//!
//! A [`CompositeJob`] is an ordered list of sub-items, typically the tracks of
//! a playlist. The [`Sequencer`] runs one sub-item at a time with the same
//! timeout and retry rules as top-level jobs, pausing between items so the
//! source service is not hammered. A failed sub-item is recorded and the
//! sequence moves on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{publish, SequenceEvent};
use super::executor;
use super::job::{JobContext, JobError, JobId, JobResult, JobSpec, JobStatus, Work};
use super::retry::{BackoffStrategy, RetryDecision, RetryPolicy};
use crate::error::{Result, TrackqError};
use crate::telemetry::SchedulerMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Sequencer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Pause between two sub-items
    pub inter_item_delay_ms: u64,
    /// Retries allowed per sub-item
    pub retry_limit: u32,
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for sub-items without their own
    pub item_timeout_ms: u64,
    pub backoff: BackoffStrategy,
    pub event_buffer: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 1000,
            retry_limit: 2,
            retry_delay_ms: 2000,
            item_timeout_ms: 300_000,
            backoff: BackoffStrategy::Fixed,
            event_buffer: 256,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.item_timeout_ms == 0 {
            return Err(TrackqError::configuration("item_timeout_ms must be positive"));
        }
        if self.event_buffer == 0 {
            return Err(TrackqError::configuration("event_buffer must be positive"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            backoff: self.backoff.clone(),
        }
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Composite Jobs
// ═══════════════════════════════════════════════════════════════════════════════

/// One entry of a composite job.
#[derive(Clone)]
pub struct SubItem {
    pub id: String,
    pub work: Arc<dyn Work>,
    pub timeout: Option<Duration>,
    pub metadata: serde_json::Value,
}

impl SubItem {
    pub fn new(id: impl Into<String>, work: impl Work + 'static) -> Self {
        Self::from_arc(id, Arc::new(work))
    }

    pub fn from_arc(id: impl Into<String>, work: Arc<dyn Work>) -> Self {
        Self {
            id: id.into(),
            work,
            timeout: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

impl fmt::Debug for SubItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubItem")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A job made of ordered sub-items processed one after another.
#[derive(Debug, Clone)]
pub struct CompositeJob {
    pub id: JobId,
    pub items: Vec<SubItem>,
}

impl CompositeJob {
    pub fn new(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            items: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: SubItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = SubItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Wrap the composite as a unit of work that runs the whole sequence.
    pub fn into_work(self, sequencer: Sequencer) -> CompositeWork {
        CompositeWork {
            job: self,
            sequencer,
        }
    }

    /// Build a scheduler job for the composite.
    ///
    /// Sub-items carry their own timeouts and retries, so the job is marked
    /// self-managed: it runs once, with no scheduler deadline over the list.
    pub fn into_spec(self, sequencer: Sequencer) -> JobSpec {
        let id = self.id.clone();
        JobSpec::new(id, self.into_work(sequencer)).self_managed()
    }
}

/// Terminal status of a sub-item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubItemStatus {
    Completed,
    Failed,
    /// The sequence was cancelled before or while the item ran
    Cancelled,
}

impl SubItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of a single sub-item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubItemReport {
    pub index: usize,
    pub id: String,
    pub status: SubItemStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

/// Outcome of a whole composite job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    pub composite_id: JobId,
    /// `Completed` once every item was processed, `Cancelled` otherwise
    pub status: JobStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub progress: u8,
    pub items: Vec<SubItemReport>,
}

/// `round(100 * done / total)`; an empty list counts as done.
pub fn progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done as f64 * 100.0) / total as f64).round() as u8
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sequencer
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs composite jobs one sub-item at a time.
#[derive(Debug, Clone)]
pub struct Sequencer {
    config: SequencerConfig,
    events: broadcast::Sender<SequenceEvent>,
}

impl Sequencer {
    pub fn new(config: SequencerConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_buffer);
        Ok(Self { config, events })
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SequenceEvent> {
        self.events.subscribe()
    }

    /// Process every sub-item of `job` in order.
    pub async fn run(&self, job: &CompositeJob) -> CompositeReport {
        self.run_with_cancellation(job, &CancellationToken::new())
            .await
    }

    /// Process every sub-item of `job` in order until `cancellation` fires.
    pub async fn run_with_cancellation(
        &self,
        job: &CompositeJob,
        cancellation: &CancellationToken,
    ) -> CompositeReport {
        let total = job.items.len();
        let policy = self.config.retry_policy();
        let mut items = Vec::with_capacity(total);
        let mut succeeded = 0;
        let mut failed = 0;

        info!(composite_id = %job.id, total, "Sequence started");

        for (index, item) in job.items.iter().enumerate() {
            let report = if cancellation.is_cancelled() {
                cancelled_report(index, item, 0)
            } else {
                self.run_item(job, index, item, &policy, cancellation).await
            };

            match report.status {
                SubItemStatus::Completed => succeeded += 1,
                SubItemStatus::Failed => failed += 1,
                SubItemStatus::Cancelled => {}
            }
            SchedulerMetrics::sequence_item(report.status.as_str());

            if report.status != SubItemStatus::Cancelled {
                let done = succeeded + failed;
                publish(
                    &self.events,
                    SequenceEvent::ItemCompleted {
                        composite_id: job.id.clone(),
                        index,
                        item_id: item.id.clone(),
                        status: report.status,
                        attempts: report.attempts,
                        progress: progress(done, total),
                        error: report.error.clone(),
                    },
                );
            }
            items.push(report);

            let is_last = index + 1 == total;
            if !is_last && !cancellation.is_cancelled() {
                tokio::select! {
                    _ = cancellation.cancelled() => {}
                    _ = tokio::time::sleep(self.config.inter_item_delay()) => {}
                }
            }
        }

        let status = if cancellation.is_cancelled() && succeeded + failed < total {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };

        if status == JobStatus::Completed {
            info!(composite_id = %job.id, total, succeeded, failed, "Sequence completed");
            publish(
                &self.events,
                SequenceEvent::Completed {
                    composite_id: job.id.clone(),
                    total,
                    succeeded,
                    failed,
                },
            );
        } else {
            info!(composite_id = %job.id, succeeded, failed, "Sequence cancelled");
        }

        CompositeReport {
            composite_id: job.id.clone(),
            status,
            total,
            succeeded,
            failed,
            progress: progress(succeeded + failed, total),
            items,
        }
    }

    async fn run_item(
        &self,
        job: &CompositeJob,
        index: usize,
        item: &SubItem,
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
    ) -> SubItemReport {
        let timeout = item.timeout.unwrap_or_else(|| self.config.item_timeout());
        let max_attempts = policy.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(composite_id = %job.id, item_id = %item.id, attempt = attempts, "Sub-item started");
            publish(
                &self.events,
                SequenceEvent::ItemStarted {
                    composite_id: job.id.clone(),
                    index,
                    item_id: item.id.clone(),
                    attempt: attempts,
                },
            );

            let ctx = JobContext::new(
                JobId::new(item.id.clone()),
                attempts,
                max_attempts,
                item.metadata.clone(),
                cancellation.child_token(),
            );
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return cancelled_report(index, item, attempts),
                outcome = executor::execute_attempt(item.work.clone(), ctx, Some(timeout)) => outcome,
            };

            let error = match outcome.result {
                Ok(result) => {
                    return SubItemReport {
                        index,
                        id: item.id.clone(),
                        status: SubItemStatus::Completed,
                        attempts,
                        result: Some(result),
                        error: None,
                    };
                }
                Err(error) => error,
            };

            match policy.decide(attempts, &error) {
                RetryDecision::Retry {
                    delay,
                    max_attempts,
                } => {
                    warn!(
                        composite_id = %job.id,
                        item_id = %item.id,
                        attempt = attempts,
                        max_attempts,
                        error = %error,
                        "Sub-item failed, retry scheduled"
                    );
                    publish(
                        &self.events,
                        SequenceEvent::ItemRetryScheduled {
                            composite_id: job.id.clone(),
                            index,
                            item_id: item.id.clone(),
                            attempt: attempts,
                            max_attempts,
                            delay_ms: delay.as_millis() as u64,
                            error,
                        },
                    );
                    tokio::select! {
                        _ = cancellation.cancelled() => return cancelled_report(index, item, attempts),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp { attempts } => {
                    warn!(composite_id = %job.id, item_id = %item.id, attempts, error = %error, "Sub-item failed");
                    return SubItemReport {
                        index,
                        id: item.id.clone(),
                        status: SubItemStatus::Failed,
                        attempts,
                        result: None,
                        error: Some(error),
                    };
                }
            }
        }
    }
}

fn cancelled_report(index: usize, item: &SubItem, attempts: u32) -> SubItemReport {
    SubItemReport {
        index,
        id: item.id.clone(),
        status: SubItemStatus::Cancelled,
        attempts,
        result: None,
        error: Some(JobError::cancelled()),
    }
}

/// A composite job running as a single scheduler job.
#[derive(Debug, Clone)]
pub struct CompositeWork {
    job: CompositeJob,
    sequencer: Sequencer,
}

impl CompositeWork {
    pub fn job(&self) -> &CompositeJob {
        &self.job
    }
}

#[async_trait]
impl Work for CompositeWork {
    async fn run(&self, ctx: JobContext) -> JobResult {
        let report = self
            .sequencer
            .run_with_cancellation(&self.job, ctx.cancellation())
            .await;
        if report.status == JobStatus::Cancelled {
            return Err(JobError::cancelled());
        }
        serde_json::to_value(&report).map_err(|e| JobError::execution(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
