//! Job definitions and traits.
//!
//! This module provides the core abstractions for schedulable work:
//!
//! - **Work trait**: The unit of work a job runs on every attempt
//! - **JobSpec**: What a producer submits
//! - **JobRecord**: The runtime state the scheduler keeps per job
//! - **JobStatus / JobPriority / JobError**: Lifecycle, ordering and failure types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorCode, TrackqError};

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-supplied identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a random identifier for producers that have none of their own.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the priority queue
    Pending,
    /// Job holds a concurrency slot and is executing
    Active,
    /// An attempt failed and a retry timer is running
    RetryScheduled,
    /// Job completed successfully
    Completed,
    /// Job failed after all attempts
    Failed,
    /// Job was removed before it could finish
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::RetryScheduled => write!(f, "retry_scheduled"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Priority
// ═══════════════════════════════════════════════════════════════════════════════

/// Priority band of a job. 0 is the highest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPriority(u8);

impl JobPriority {
    pub const HIGHEST: JobPriority = JobPriority(0);

    /// Clamp a raw priority into `[0, levels - 1]`.
    pub fn clamped(raw: i64, levels: u8) -> Self {
        let max = i64::from(levels.max(1) - 1);
        Self(raw.clamp(0, max) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// Malformed job; never admitted
    Validation,
    /// The unit of work returned an error or panicked
    Execution,
    /// The attempt exceeded its timeout
    Timeout,
    /// The job was removed
    Cancelled,
}

impl JobErrorKind {
    /// Only execution failures and timeouts take part in the retry cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for job execution failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    /// Failure classification
    pub kind: JobErrorKind,
    /// Error message
    pub message: String,
    /// Optional error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Additional context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl JobError {
    fn of_kind(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            context: None,
        }
    }

    /// The unit of work failed.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::of_kind(JobErrorKind::Execution, message)
    }

    /// The attempt ran longer than `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::of_kind(
            JobErrorKind::Timeout,
            format!("timed out after {}ms", timeout.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::of_kind(JobErrorKind::Cancelled, "cancelled")
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::of_kind(JobErrorKind::Validation, message)
    }

    /// Add an error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Add context.
    pub fn with_context(mut self, context: impl Serialize) -> Self {
        self.context = serde_json::to_value(context).ok();
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for JobError {}

impl From<TrackqError> for JobError {
    fn from(error: TrackqError) -> Self {
        let kind = match error.code() {
            ErrorCode::JobTimeout => JobErrorKind::Timeout,
            ErrorCode::JobCancelled => JobErrorKind::Cancelled,
            ErrorCode::ValidationError | ErrorCode::DuplicateJob => JobErrorKind::Validation,
            _ => JobErrorKind::Execution,
        };
        Self {
            kind,
            message: error.user_message().to_string(),
            code: Some(error.code().to_string()),
            context: None,
        }
    }
}

/// Result type for one attempt of a unit of work.
pub type JobResult = std::result::Result<serde_json::Value, JobError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Context passed to a unit of work on every attempt.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: JobId,
    attempt: u32,
    max_attempts: u32,
    metadata: serde_json::Value,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        attempt: u32,
        max_attempts: u32,
        metadata: serde_json::Value,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            attempt,
            max_attempts,
            metadata,
            cancellation,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Current attempt number (1-indexed).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Fired when the job is cancelled or cleared while running.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Log a message associated with this job.
    pub fn log_info(&self, message: &str) {
        tracing::info!(job_id = %self.job_id, attempt = self.attempt, message);
    }

    /// Log a warning associated with this job.
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(job_id = %self.job_id, attempt = self.attempt, message);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Work Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of work the scheduler runs once per attempt.
///
/// Implementations must be re-runnable: a failed attempt that is retried
/// calls [`Work::run`] again with a fresh [`JobContext`].
#[async_trait]
pub trait Work: Send + Sync {
    async fn run(&self, ctx: JobContext) -> JobResult;
}

#[async_trait]
impl<F, Fut> Work for F
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobResult> + Send,
{
    async fn run(&self, ctx: JobContext) -> JobResult {
        (self)(ctx).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Spec
// ═══════════════════════════════════════════════════════════════════════════════

/// Descriptor a producer submits to the scheduler.
#[derive(Clone)]
pub struct JobSpec {
    pub id: JobId,
    /// Raw priority; clamped into the configured band range on submission
    pub priority: Option<i64>,
    pub work: Arc<dyn Work>,
    /// Per-attempt timeout; falls back to the scheduler default
    pub timeout: Option<Duration>,
    /// Caller-opaque payload echoed in every lifecycle event
    pub metadata: serde_json::Value,
    /// Work applies its own timeouts and retries; the scheduler runs it once
    /// with no deadline
    pub self_managed: bool,
}

impl JobSpec {
    pub fn new(id: impl Into<JobId>, work: impl Work + 'static) -> Self {
        Self::from_arc(id, Arc::new(work))
    }

    pub fn from_arc(id: impl Into<JobId>, work: Arc<dyn Work>) -> Self {
        Self {
            id: id.into(),
            priority: None,
            work,
            timeout: None,
            metadata: serde_json::Value::Null,
            self_managed: false,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Exempt the work from the scheduler's attempt timeout and retries.
    pub fn self_managed(mut self) -> Self {
        self.self_managed = true;
        self
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("metadata", &self.metadata)
            .field("self_managed", &self.self_managed)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Record
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one failed attempt, kept for the terminal failure report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub error: JobError,
    pub elapsed_ms: u64,
}

/// Runtime state of a submitted job.
#[derive(Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub priority: JobPriority,
    pub work: Arc<dyn Work>,
    pub timeout: Duration,
    pub metadata: serde_json::Value,
    pub self_managed: bool,
    /// Dispatches to the executor so far
    pub attempts: u32,
    /// Time of the latest admission into the priority queue, for reporting only
    pub added_at: DateTime<Utc>,
    /// Admission order within a priority band
    pub sequence: u64,
    pub status: JobStatus,
    pub last_error: Option<JobError>,
    /// Failed attempts so far, oldest first
    pub history: Vec<AttemptFailure>,
}

impl JobRecord {
    pub fn new(
        spec: JobSpec,
        priority: JobPriority,
        timeout: Duration,
        sequence: u64,
    ) -> Self {
        Self {
            id: spec.id,
            priority,
            work: spec.work,
            timeout,
            metadata: spec.metadata,
            self_managed: spec.self_managed,
            attempts: 0,
            added_at: Utc::now(),
            sequence,
            status: JobStatus::Pending,
            last_error: None,
            history: Vec::new(),
        }
    }

    /// Ordering key inside the priority queue.
    pub fn admission_key(&self) -> (JobPriority, u64) {
        (self.priority, self.sequence)
    }

    /// Per-attempt deadline, or none when the work manages its own.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (!self.self_managed).then_some(self.timeout)
    }

    /// Back into the queue with a fresh admission time.
    pub fn mark_pending(&mut self, sequence: u64) {
        self.status = JobStatus::Pending;
        self.added_at = Utc::now();
        self.sequence = sequence;
    }

    pub fn mark_active(&mut self) {
        self.status = JobStatus::Active;
        self.attempts += 1;
    }

    /// Record a failed attempt without changing status.
    pub fn record_failure(&mut self, error: JobError, elapsed: Duration) {
        self.history.push(AttemptFailure {
            attempt: self.attempts,
            error: error.clone(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
        self.last_error = Some(error);
    }

    pub fn mark_retry_scheduled(&mut self) {
        self.status = JobStatus::RetryScheduled;
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("added_at", &self.added_at)
            .field("sequence", &self.sequence)
            .field("last_error", &self.last_error)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
