//! Job scheduling engine.
//!
//! This module provides:
//!
//! - **Jobs**: Units of work with priority, timeout and retry state
//! - **Queue**: Priority-ordered pending jobs with FIFO order inside a band
//! - **Scheduler**: Bounded-concurrency dispatch with timeouts and retries
//! - **Sequencer**: One-at-a-time processing of composite (playlist) jobs
//! - **Events / Stats**: Lifecycle notifications and counters
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               Scheduler                                  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  submit ──▶ PriorityQueue ──tick──▶ active set ──▶ executor (tokio task) │
//! │                  ▲                                     │                 │
//! │                  │                                     ▼                 │
//! │            retry timer ◀──── RetryPolicy ◀──── attempt failed            │
//! │                                                                          │
//! │  JobEvent broadcast: added / started / completed / retry / failed / ...  │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use trackq_core::jobs::{
//!     CompositeJob, JobContext, JobError, JobSpec, Scheduler, SchedulerConfig,
//!     Sequencer, SequencerConfig, SubItem,
//! };
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let mut events = scheduler.subscribe();
//!
//! scheduler.submit(JobSpec::new("single", |ctx: JobContext| async move {
//!     ctx.log_info("downloading");
//!     Ok::<_, JobError>(serde_json::Value::Null)
//! }))?;
//!
//! let playlist = CompositeJob::new("playlist")
//!     .with_item(SubItem::new("track-1", download_track))
//!     .with_item(SubItem::new("track-2", download_track));
//! let sequencer = Sequencer::new(SequencerConfig::default())?;
//! scheduler.submit(playlist.into_spec(sequencer))?;
//! ```

pub mod events;
pub mod executor;
pub mod job;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod sequencer;
pub mod stats;

pub use events::{JobEvent, RemovalReason, SequenceEvent};
pub use executor::{execute_attempt, AttemptOutcome};
pub use job::{
    AttemptFailure, JobContext, JobError, JobErrorKind, JobId, JobPriority, JobRecord,
    JobResult, JobSpec, JobStatus, Work,
};
pub use queue::PriorityQueue;
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
pub use scheduler::{DispatcherHandle, Scheduler, SchedulerConfig};
pub use sequencer::{
    CompositeJob, CompositeReport, CompositeWork, Sequencer, SequencerConfig, SubItem,
    SubItemReport, SubItemStatus,
};
pub use stats::{SchedulerStats, SchedulerStatus};
