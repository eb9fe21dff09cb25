//! Configuration management.
//!
//! Configuration is read from an optional file (TOML, YAML or JSON, picked by
//! extension) and `TRACKQ__*` environment variables, e.g.
//! `TRACKQ__SCHEDULER__MAX_CONCURRENT=5`. Durations use humantime notation
//! (`"2s"`, `"5m"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ErrorCode, Result, TrackqError};
use crate::jobs::{BackoffStrategy, SchedulerConfig, SequencerConfig};
use crate::telemetry::{LoggingConfig, MetricsConfig};

const ENV_PREFIX: &str = "TRACKQ";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Playlist sequencing configuration
    #[serde(default)]
    pub sequencer: SequencerSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Maximum jobs running at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Retries after the first attempt
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Delay before a failed job re-enters the queue
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default = "default_priority_levels")]
    pub priority_levels: u8,

    #[serde(default = "default_priority")]
    pub default_priority: u8,

    /// Period of the background dispatcher
    #[serde(default = "default_dispatch_interval", with = "humantime_serde")]
    pub dispatch_interval: Duration,

    /// Per-attempt timeout for jobs without their own
    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub default_timeout: Duration,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retry_limit: default_retry_limit(),
            retry_delay: default_retry_delay(),
            priority_levels: default_priority_levels(),
            default_priority: default_priority(),
            dispatch_interval: default_dispatch_interval(),
            default_timeout: default_job_timeout(),
            backoff: BackoffStrategy::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerSettings {
    /// Pause between two playlist items
    #[serde(default = "default_inter_item_delay", with = "humantime_serde")]
    pub inter_item_delay: Duration,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default = "default_job_timeout", with = "humantime_serde")]
    pub item_timeout: Duration,

    #[serde(default)]
    pub backoff: BackoffStrategy,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            inter_item_delay: default_inter_item_delay(),
            retry_limit: default_retry_limit(),
            retry_delay: default_retry_delay(),
            item_timeout: default_job_timeout(),
            backoff: BackoffStrategy::default(),
        }
    }
}

// Default value functions
fn default_max_concurrent() -> usize { 3 }
fn default_retry_limit() -> u32 { 2 }
fn default_retry_delay() -> Duration { Duration::from_secs(2) }
fn default_priority_levels() -> u8 { 3 }
fn default_priority() -> u8 { 1 }
fn default_dispatch_interval() -> Duration { Duration::from_secs(1) }
fn default_job_timeout() -> Duration { Duration::from_secs(300) }
fn default_event_buffer() -> usize { 1024 }
fn default_inter_item_delay() -> Duration { Duration::from_secs(1) }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from `path` when given, otherwise from the environment only.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    /// Validated scheduler configuration.
    pub fn to_scheduler_config(&self) -> Result<SchedulerConfig> {
        let s = &self.scheduler;
        let config = SchedulerConfig {
            max_concurrent: s.max_concurrent,
            retry_limit: s.retry_limit,
            retry_delay_ms: s.retry_delay.as_millis() as u64,
            priority_levels: s.priority_levels,
            default_priority: s.default_priority,
            dispatch_interval_ms: s.dispatch_interval.as_millis() as u64,
            default_timeout_ms: s.default_timeout.as_millis() as u64,
            backoff: s.backoff.clone(),
            event_buffer: s.event_buffer,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validated sequencer configuration.
    pub fn to_sequencer_config(&self) -> Result<SequencerConfig> {
        let s = &self.sequencer;
        let config = SequencerConfig {
            inter_item_delay_ms: s.inter_item_delay.as_millis() as u64,
            retry_limit: s.retry_limit,
            retry_delay_ms: s.retry_delay.as_millis() as u64,
            item_timeout_ms: s.item_timeout.as_millis() as u64,
            backoff: s.backoff.clone(),
            ..SequencerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. for `trackq config init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            TrackqError::with_internal(
                ErrorCode::SerializationError,
                "Failed to render configuration",
                e.to_string(),
            )
            .with_source(e)
        })
    }
}
