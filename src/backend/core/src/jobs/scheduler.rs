//! Bounded-concurrency job scheduler.
//!
//! All queues, the active set and the counters live behind one mutex that is
//! never held across an `.await`. Every state change (submission, attempt
//! completion, retry timer, removal, resume, config update) goes through that
//! lock and ends with a dispatch pass that fills free slots from the priority
//! queue.
//!
//! # Example
//!
//! ```rust,ignore
//! use trackq_core::jobs::{JobContext, JobError, JobSpec, Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let dispatcher = scheduler.spawn_dispatcher()?;
//!
//! scheduler.submit(
//!     JobSpec::new("track-1", |ctx: JobContext| async move {
//!         Ok::<_, JobError>(serde_json::json!({"file": format!("{}.flac", ctx.job_id())}))
//!     })
//!     .with_priority(0),
//! )?;
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::events::{publish, JobEvent, RemovalReason};
use super::executor::{self, AttemptOutcome};
use super::job::{JobContext, JobId, JobPriority, JobRecord, JobSpec, JobStatus};
use super::queue::PriorityQueue;
use super::retry::{BackoffStrategy, RetryDecision, RetryPolicy};
use super::stats::{SchedulerStats, SchedulerStatus};
use crate::error::{Result, TrackqError};
use crate::telemetry::SchedulerMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Scheduler configuration. Replaced wholesale by [`Scheduler::update_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once
    pub max_concurrent: usize,
    /// Retries allowed after the first attempt
    pub retry_limit: u32,
    /// Base delay before a failed job re-enters the queue
    pub retry_delay_ms: u64,
    /// Number of priority bands; 0 is the highest
    pub priority_levels: u8,
    /// Band used when a job has no priority
    pub default_priority: u8,
    /// Period of the background dispatcher
    pub dispatch_interval_ms: u64,
    /// Per-attempt timeout for jobs without their own
    pub default_timeout_ms: u64,
    pub backoff: BackoffStrategy,
    /// Capacity of the event channel. Only read when the scheduler is built.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            retry_limit: 2,
            retry_delay_ms: 2000,
            priority_levels: 3,
            default_priority: 1,
            dispatch_interval_ms: 1000,
            default_timeout_ms: 300_000,
            backoff: BackoffStrategy::Fixed,
            event_buffer: 1024,
        }
    }
}

impl SchedulerConfig {
    /// Check the configuration for values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(TrackqError::configuration("max_concurrent must be at least 1"));
        }
        if self.priority_levels == 0 {
            return Err(TrackqError::configuration("priority_levels must be at least 1"));
        }
        if self.default_priority >= self.priority_levels {
            return Err(TrackqError::configuration(format!(
                "default_priority {} is outside 0..{}",
                self.default_priority, self.priority_levels
            )));
        }
        if self.dispatch_interval_ms == 0 {
            return Err(TrackqError::configuration("dispatch_interval_ms must be positive"));
        }
        if self.default_timeout_ms == 0 {
            return Err(TrackqError::configuration("default_timeout_ms must be positive"));
        }
        if self.event_buffer == 0 {
            return Err(TrackqError::configuration("event_buffer must be positive"));
        }
        if let BackoffStrategy::Exponential { multiplier, .. } = self.backoff {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(TrackqError::configuration(
                    "exponential backoff multiplier must be at least 1.0",
                ));
            }
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

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal State
// ═══════════════════════════════════════════════════════════════════════════════

struct ActiveJob {
    job: JobRecord,
    /// Admission token; completions carrying another token are stale
    run_id: u64,
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

struct RetryingJob {
    job: JobRecord,
    token: u64,
    timer: JoinHandle<()>,
}

struct State {
    config: SchedulerConfig,
    queue: PriorityQueue,
    active: HashMap<JobId, ActiveJob>,
    retrying: HashMap<JobId, RetryingJob>,
    paused: bool,
    stats: SchedulerStats,
    runtime: Option<Handle>,
    next_sequence: u64,
    next_token: u64,
}

impl State {
    fn available_slots(&self) -> usize {
        self.config.max_concurrent.saturating_sub(self.active.len())
    }

    fn is_live(&self, id: &JobId) -> bool {
        self.queue.contains(id) || self.active.contains_key(id) || self.retrying.contains_key(id)
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty() && self.retrying.is_empty()
    }

    fn sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

struct Inner {
    state: Mutex<State>,
    events: broadcast::Sender<JobEvent>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scheduler
// ═══════════════════════════════════════════════════════════════════════════════

/// Priority job scheduler with bounded concurrency, timeouts and retries.
///
/// Cloning is cheap; every clone drives the same queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a scheduler. Nothing runs until a job is submitted.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_buffer);

        info!(
            max_concurrent = config.max_concurrent,
            retry_limit = config.retry_limit,
            priority_levels = config.priority_levels,
            "Scheduler created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    config,
                    queue: PriorityQueue::new(),
                    active: HashMap::new(),
                    retrying: HashMap::new(),
                    paused: false,
                    stats: SchedulerStats::default(),
                    runtime: None,
                    next_sequence: 0,
                    next_token: 0,
                }),
                events,
            }),
        })
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Producer API
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue a job and dispatch immediately if a slot is free.
    ///
    /// Must be called from within a tokio runtime. Ids are unique among live
    /// jobs; an id may be reused once its previous job has finished.
    pub fn submit(&self, spec: JobSpec) -> Result<JobId> {
        if spec.id.is_blank() {
            return Err(TrackqError::validation("job id must not be empty"));
        }
        if spec.timeout == Some(Duration::ZERO) {
            return Err(TrackqError::validation("job timeout must be positive")
                .with_context("job_id", spec.id.as_str()));
        }
        let runtime = Handle::try_current().map_err(|_| TrackqError::runtime_unavailable())?;

        let mut state = self.inner.state.lock();
        if state.is_live(&spec.id) {
            return Err(TrackqError::duplicate_job(&spec.id));
        }
        state.runtime = Some(runtime);

        let levels = state.config.priority_levels;
        let priority = JobPriority::clamped(
            spec.priority.unwrap_or(i64::from(state.config.default_priority)),
            levels,
        );
        let timeout = spec.timeout.unwrap_or_else(|| state.config.default_timeout());
        let sequence = state.sequence();
        let job = JobRecord::new(spec, priority, timeout, sequence);
        let id = job.id.clone();

        state.stats.record_added();
        SchedulerMetrics::job_added(priority.value());
        info!(job_id = %id, priority = priority.value(), "Job submitted");
        publish(
            &self.inner.events,
            JobEvent::Added {
                job_id: id.clone(),
                priority,
                metadata: job.metadata.clone(),
            },
        );

        state.queue.enqueue(job);
        self.dispatch(&mut state);
        Ok(id)
    }

    /// Remove a live job wherever it is. Returns false if no such job is live.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(job) = Self::take_live(&mut state, id) else {
            return false;
        };

        self.record_removal(&mut state, job, RemovalReason::Manual);
        self.after_departure(&mut state);
        self.dispatch(&mut state);
        true
    }

    /// Remove every pending and retry-scheduled job, and active jobs too unless
    /// `keep_active` is set. Returns the number of jobs removed.
    pub fn clear(&self, keep_active: bool) -> usize {
        let mut state = self.inner.state.lock();
        let mut removed = 0;

        for job in state.queue.drain() {
            self.record_removal(&mut state, job, RemovalReason::Cleared);
            removed += 1;
        }

        let mut retrying: Vec<RetryingJob> = state.retrying.drain().map(|(_, r)| r).collect();
        retrying.sort_by_key(|r| r.token);
        for entry in retrying {
            entry.timer.abort();
            self.record_removal(&mut state, entry.job, RemovalReason::Cleared);
            removed += 1;
        }

        if !keep_active {
            let mut active: Vec<ActiveJob> = state.active.drain().map(|(_, a)| a).collect();
            active.sort_by_key(|a| a.run_id);
            for entry in active {
                entry.cancellation.cancel();
                entry.handle.abort();
                self.record_removal(&mut state, entry.job, RemovalReason::QueueCleared);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, keep_active, "Queue cleared");
            self.after_departure(&mut state);
        }
        removed
    }

    /// Stop admitting jobs. Active jobs keep running.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        info!("Scheduler paused");
        publish(&self.inner.events, JobEvent::Paused);
    }

    /// Resume admissions and dispatch once.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        if state.paused {
            state.paused = false;
            info!("Scheduler resumed");
            publish(&self.inner.events, JobEvent::Resumed);
        }
        self.dispatch(&mut state);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Replace the configuration. Jobs already queued keep their priority and
    /// timeout; a larger `max_concurrent` takes effect immediately.
    pub fn update_config(&self, config: SchedulerConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.inner.state.lock();
        info!(
            max_concurrent = config.max_concurrent,
            retry_limit = config.retry_limit,
            "Scheduler configuration updated"
        );
        state.config = config;
        self.dispatch(&mut state);
        Ok(())
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.state.lock().config.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot of queue, active set and counters.
    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.state.lock();

        let mut active: Vec<&ActiveJob> = state.active.values().collect();
        active.sort_by_key(|a| a.run_id);
        let mut retrying: Vec<&RetryingJob> = state.retrying.values().collect();
        retrying.sort_by_key(|r| r.token);

        SchedulerStatus {
            queue_length: state.queue.len(),
            active_ids: active.into_iter().map(|a| a.job.id.clone()).collect(),
            retry_scheduled_ids: retrying.into_iter().map(|r| r.job.id.clone()).collect(),
            is_paused: state.paused,
            counts_by_priority: state.queue.counts_by_priority(),
            max_concurrent: state.config.max_concurrent,
            stats: state.stats.clone(),
        }
    }

    /// Status of a live job. Finished jobs are not tracked.
    pub fn job_status(&self, id: &JobId) -> Option<JobStatus> {
        let state = self.inner.state.lock();
        if state.queue.contains(id) {
            Some(JobStatus::Pending)
        } else if state.active.contains_key(id) {
            Some(JobStatus::Active)
        } else if state.retrying.contains_key(id) {
            Some(JobStatus::RetryScheduled)
        } else {
            None
        }
    }

    /// Zero-based position of a pending job in dispatch order.
    pub fn position_of(&self, id: &JobId) -> Option<usize> {
        self.inner.state.lock().queue.position_of(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit as many pending jobs as there are free slots.
    pub fn tick(&self) {
        let mut state = self.inner.state.lock();
        self.dispatch(&mut state);
    }

    /// Spawn the periodic dispatcher. It stops when the handle is shut down or
    /// dropped, or when every scheduler clone is gone.
    pub fn spawn_dispatcher(&self) -> Result<DispatcherHandle> {
        let runtime = Handle::try_current().map_err(|_| TrackqError::runtime_unavailable())?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let task = runtime.spawn(async move {
            debug!("Dispatcher started");
            loop {
                let interval = match weak.upgrade() {
                    Some(inner) => {
                        let interval = inner.state.lock().config.dispatch_interval();
                        interval
                    }
                    None => break,
                };

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        match weak.upgrade() {
                            Some(inner) => Scheduler { inner }.tick(),
                            None => break,
                        }
                    }
                }
            }
            debug!("Dispatcher stopped");
        });

        Ok(DispatcherHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    /// One dispatch pass over a snapshot of the free slots.
    fn dispatch(&self, state: &mut State) -> usize {
        if state.paused || state.queue.is_empty() {
            return 0;
        }
        let slots = state.available_slots();
        if slots == 0 {
            return 0;
        }
        let Some(runtime) = state.runtime.clone() else {
            return 0;
        };

        let policy_attempts = state.config.retry_policy().max_attempts();
        let batch = state.queue.dequeue_up_to(slots);
        let admitted = batch.len();

        for mut job in batch {
            job.mark_active();
            let max_attempts = if job.self_managed { 1 } else { policy_attempts };
            let run_id = state.token();
            let cancellation = CancellationToken::new();
            let ctx = JobContext::new(
                job.id.clone(),
                job.attempts,
                max_attempts,
                job.metadata.clone(),
                cancellation.clone(),
            );

            debug!(job_id = %job.id, attempt = job.attempts, priority = job.priority.value(), "Job started");
            publish(
                &self.inner.events,
                JobEvent::Started {
                    job_id: job.id.clone(),
                    attempt: job.attempts,
                    max_attempts,
                    metadata: job.metadata.clone(),
                },
            );

            let scheduler = self.clone();
            let id = job.id.clone();
            let work = job.work.clone();
            let timeout = job.attempt_timeout();
            let span = info_span!("job", job_id = %id, attempt = job.attempts);
            let handle = runtime.spawn(
                async move {
                    let outcome = executor::execute_attempt(work, ctx, timeout).await;
                    scheduler.finish(&id, run_id, outcome);
                }
                .instrument(span),
            );

            state.active.insert(
                job.id.clone(),
                ActiveJob {
                    job,
                    run_id,
                    cancellation,
                    handle,
                },
            );
        }

        SchedulerMetrics::depth(state.queue.len(), state.active.len());
        admitted
    }

    /// Apply the outcome of an attempt if its admission is still current.
    fn finish(&self, id: &JobId, run_id: u64, outcome: AttemptOutcome) {
        let mut state = self.inner.state.lock();
        let current = state
            .active
            .get(id)
            .is_some_and(|active| active.run_id == run_id);
        if !current {
            debug!(job_id = %id, run_id, "Discarding stale completion");
            return;
        }
        let Some(active) = state.active.remove(id) else {
            return;
        };
        let mut job = active.job;

        match outcome.result {
            Ok(result) => {
                job.mark_completed();
                state.stats.record_completed(outcome.elapsed);
                SchedulerMetrics::job_completed(outcome.elapsed);
                info!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Job completed"
                );
                publish(
                    &self.inner.events,
                    JobEvent::Completed {
                        job_id: job.id.clone(),
                        attempt: job.attempts,
                        elapsed_ms: outcome.elapsed.as_millis() as u64,
                        result,
                        metadata: job.metadata.clone(),
                    },
                );
            }
            Err(error) => {
                job.record_failure(error, outcome.elapsed);
                self.on_failure(&mut state, job);
            }
        }

        self.after_departure(&mut state);
        self.dispatch(&mut state);
    }

    /// Retry controller: schedule a retry or fail the job for good.
    fn on_failure(&self, state: &mut State, mut job: JobRecord) {
        let Some(error) = job.last_error.clone() else {
            return;
        };

        let decision = if job.self_managed {
            RetryDecision::GiveUp {
                attempts: job.attempts,
            }
        } else {
            state.config.retry_policy().decide(job.attempts, &error)
        };

        match decision {
            RetryDecision::Retry {
                delay,
                max_attempts,
            } => {
                let Some(runtime) = state.runtime.clone() else {
                    return;
                };
                job.mark_retry_scheduled();
                state.stats.record_retried();
                SchedulerMetrics::job_retried(error.kind.as_str());
                warn!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retry scheduled"
                );
                publish(
                    &self.inner.events,
                    JobEvent::RetryScheduled {
                        job_id: job.id.clone(),
                        attempt: job.attempts,
                        max_attempts,
                        delay_ms: delay.as_millis() as u64,
                        error,
                        metadata: job.metadata.clone(),
                    },
                );

                let token = state.token();
                let scheduler = self.clone();
                let id = job.id.clone();
                let timer = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    scheduler.requeue(&id, token);
                });
                state
                    .retrying
                    .insert(job.id.clone(), RetryingJob { job, token, timer });
            }
            RetryDecision::GiveUp { attempts } => {
                job.mark_failed();
                state.stats.record_failed();
                SchedulerMetrics::job_failed(error.kind.as_str());
                warn!(job_id = %job.id, attempts, error = %error, "Job failed");
                publish(
                    &self.inner.events,
                    JobEvent::Failed {
                        job_id: job.id.clone(),
                        attempts,
                        error,
                        history: job.history.clone(),
                        metadata: job.metadata.clone(),
                    },
                );
            }
        }
    }

    /// Retry timer fired: put the job at the back of its band.
    fn requeue(&self, id: &JobId, token: u64) {
        let mut state = self.inner.state.lock();
        let current = state
            .retrying
            .get(id)
            .is_some_and(|retrying| retrying.token == token);
        if !current {
            return;
        }
        let Some(RetryingJob { mut job, .. }) = state.retrying.remove(id) else {
            return;
        };

        let sequence = state.sequence();
        job.mark_pending(sequence);
        debug!(job_id = %job.id, attempts = job.attempts, "Job re-queued for retry");
        state.queue.enqueue(job);
        self.dispatch(&mut state);
    }

    fn take_live(state: &mut State, id: &JobId) -> Option<JobRecord> {
        if let Some(job) = state.queue.remove(id) {
            return Some(job);
        }
        if let Some(active) = state.active.remove(id) {
            active.cancellation.cancel();
            active.handle.abort();
            return Some(active.job);
        }
        if let Some(retrying) = state.retrying.remove(id) {
            retrying.timer.abort();
            return Some(retrying.job);
        }
        None
    }

    fn record_removal(&self, state: &mut State, mut job: JobRecord, reason: RemovalReason) {
        let previous_status = job.status;
        job.mark_cancelled();
        state.stats.record_removed();
        SchedulerMetrics::job_removed(reason.as_str());
        info!(job_id = %job.id, reason = reason.as_str(), previous = %previous_status, "Job removed");
        publish(
            &self.inner.events,
            JobEvent::Removed {
                job_id: job.id,
                reason,
                previous_status,
                metadata: job.metadata,
            },
        );
    }

    /// Bookkeeping after a job left the active set or the queue.
    fn after_departure(&self, state: &mut State) {
        SchedulerMetrics::depth(state.queue.len(), state.active.len());
        if state.is_idle() {
            debug!("Queue empty");
            publish(&self.inner.events, JobEvent::QueueEmpty);
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("queue_length", &state.queue.len())
            .field("active", &state.active.len())
            .field("retrying", &state.retrying.len())
            .field("paused", &state.paused)
            .finish()
    }
}

/// Handle to the periodic dispatcher task.
///
/// Dropping the handle stops the dispatcher as well.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal the dispatcher to stop after its current iteration.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the dispatcher and wait for it to exit.
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.task.await.map_err(|e| {
            TrackqError::new(
                crate::error::ErrorCode::DispatcherStopped,
                "Dispatcher task ended abnormally",
            )
            .with_source(e)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::jobs::job::JobError;

    fn ok_job(id: &str) -> JobSpec {
        JobSpec::new(id, |_ctx: JobContext| async {
            Ok::<_, JobError>(serde_json::Value::Null)
        })
    }

    #[test]
    fn test_config_defaults_validate() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy().max_attempts(), 3);
        assert_eq!(config.dispatch_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation() {
        let invalid = [
            SchedulerConfig {
                max_concurrent: 0,
                ..Default::default()
            },
            SchedulerConfig {
                priority_levels: 0,
                ..Default::default()
            },
            SchedulerConfig {
                default_priority: 3,
                ..Default::default()
            },
            SchedulerConfig {
                default_timeout_ms: 0,
                ..Default::default()
            },
            SchedulerConfig {
                backoff: BackoffStrategy::Exponential {
                    multiplier: 0.5,
                    max_delay_ms: 1000,
                },
                ..Default::default()
            },
        ];

        for config in invalid {
            let error = config.validate().unwrap_err();
            assert_eq!(error.code(), ErrorCode::InvalidConfiguration);
        }
    }

    #[test]
    fn test_submit_requires_runtime() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let error = scheduler.submit(ok_job("a")).unwrap_err();
        assert_eq!(error.code(), ErrorCode::RuntimeUnavailable);
        assert_eq!(scheduler.status().queue_length, 0);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();

        let error = scheduler.submit(ok_job("")).unwrap_err();
        assert_eq!(error.code(), ErrorCode::ValidationError);

        let error = scheduler
            .submit(ok_job("a").with_timeout(Duration::ZERO))
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::ValidationError);
        assert_eq!(scheduler.status().stats.added, 0);
    }

    #[tokio::test]
    async fn test_paused_submission_stays_queued() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.pause();
        scheduler.submit(ok_job("a").with_priority(7)).unwrap();

        let id = JobId::new("a");
        assert_eq!(scheduler.job_status(&id), Some(JobStatus::Pending));
        assert_eq!(scheduler.position_of(&id), Some(0));

        let status = scheduler.status();
        assert!(status.is_paused);
        assert_eq!(status.counts_by_priority.get(&2), Some(&1));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        assert!(!scheduler.cancel(&JobId::new("missing")));
        assert_eq!(scheduler.status().stats.removed, 0);
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let result = scheduler.update_config(SchedulerConfig {
            max_concurrent: 0,
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(scheduler.config().max_concurrent, 3);
    }

    // ========================================================================
    // Periodic Dispatch
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_periodic_tick_admits_stranded_job() {
        let scheduler = Scheduler::new(SchedulerConfig {
            dispatch_interval_ms: 50,
            ..Default::default()
        })
        .unwrap();
        let id = JobId::new("a");
        scheduler.pause();
        scheduler.submit(ok_job("a")).unwrap();
        // Unpause without the dispatch that resume() performs, so only the
        // periodic tick can admit the job.
        scheduler.inner.state.lock().paused = false;

        let mut events = scheduler.subscribe();
        let dispatcher = scheduler.spawn_dispatcher().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(scheduler.job_status(&id), Some(JobStatus::Pending));

        tokio::time::sleep(Duration::from_millis(30)).await;
        match events.recv().await.unwrap() {
            JobEvent::Started {
                job_id, attempt, ..
            } => {
                assert_eq!(job_id, id);
                assert_eq!(attempt, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(scheduler.status().queue_length, 0);

        dispatcher.stop().await.unwrap();
    }
}
