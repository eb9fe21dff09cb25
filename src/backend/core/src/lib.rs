#![allow(clippy::result_large_err)]
//! # trackq core
//!
//! Job scheduling engine for a media downloader.
//!
//! ## Architecture
//!
//! - **Scheduler**: Priority queue with bounded concurrency, per-attempt timeouts and retries
//! - **Sequencer**: Serial, rate-limited processing of playlist-style composite jobs
//! - **Events**: Lifecycle notifications over broadcast channels
//! - **Telemetry**: Structured logging and Prometheus metrics
//! - **Config**: File and environment based configuration

pub mod config;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, TrackqError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ErrorCode, Result, TrackqError};
    pub use crate::jobs::{
        BackoffStrategy, CompositeJob, CompositeReport, DispatcherHandle, JobContext, JobError,
        JobErrorKind, JobEvent, JobId, JobResult, JobSpec, JobStatus, RemovalReason, Scheduler,
        SchedulerConfig, SchedulerStatus, SequenceEvent, Sequencer, SequencerConfig, SubItem,
        SubItemStatus, Work,
    };
}
