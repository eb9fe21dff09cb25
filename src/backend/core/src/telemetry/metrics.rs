//! Prometheus metrics for the job scheduler.
//!
//! Metrics are recorded through the `metrics` facade, so they cost nothing
//! until a recorder is installed with [`init_metrics`].
//!
//! # Example
//!
//! ```rust,no_run
//! use trackq_core::telemetry::metrics::{init_metrics, MetricsConfig};
//!
//! let registry = init_metrics(&MetricsConfig { enabled: true, ..Default::default() })
//!     .expect("metrics recorder");
//! println!("{}", registry.render());
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder
    #[serde(default)]
    pub enabled: bool,

    /// Histogram buckets for job durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]
}

/// Handle to the installed recorder.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder behind it.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    /// Whether a Prometheus recorder is installed.
    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(
        buckets = config.duration_buckets.len(),
        "Metrics initialized"
    );

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("trackq_jobs_added_total", "Jobs accepted by the scheduler");
    describe_counter!("trackq_jobs_completed_total", "Jobs that completed successfully");
    describe_counter!("trackq_jobs_failed_total", "Jobs that failed after all attempts");
    describe_counter!("trackq_jobs_retried_total", "Retries scheduled after a failed attempt");
    describe_counter!("trackq_jobs_removed_total", "Jobs cancelled or cleared before finishing");
    describe_histogram!(
        "trackq_job_duration_seconds",
        "Duration of successful job attempts in seconds"
    );
    describe_gauge!("trackq_queue_length", "Jobs waiting in the priority queue");
    describe_gauge!("trackq_active_jobs", "Jobs currently executing");
    describe_counter!(
        "trackq_sequence_items_total",
        "Composite sub-items finished, by outcome"
    );
    describe_counter!("trackq_errors_total", "Errors raised by trackq, by code");
}

/// Scheduler metric helpers.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    pub fn job_added(priority: u8) {
        counter!("trackq_jobs_added_total", "priority" => priority.to_string()).increment(1);
    }

    pub fn job_completed(duration: Duration) {
        counter!("trackq_jobs_completed_total").increment(1);
        histogram!("trackq_job_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn job_failed(reason: &'static str) {
        counter!("trackq_jobs_failed_total", "reason" => reason).increment(1);
    }

    pub fn job_retried(reason: &'static str) {
        counter!("trackq_jobs_retried_total", "reason" => reason).increment(1);
    }

    pub fn job_removed(reason: &'static str) {
        counter!("trackq_jobs_removed_total", "reason" => reason).increment(1);
    }

    pub fn depth(queue_length: usize, active: usize) {
        gauge!("trackq_queue_length").set(queue_length as f64);
        gauge!("trackq_active_jobs").set(active as f64);
    }

    pub fn sequence_item(outcome: &'static str) {
        counter!("trackq_sequence_items_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.duration_buckets.len(), 10);
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = init_metrics(&MetricsConfig::default()).unwrap();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_empty());
    }

    #[test]
    fn test_helpers_without_recorder() {
        // With no recorder installed these are no-ops.
        SchedulerMetrics::job_added(1);
        SchedulerMetrics::job_completed(Duration::from_millis(250));
        SchedulerMetrics::depth(3, 1);
    }
}
