//! `trackq run`: execute a manifest and wait for the queue to drain.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tabled::Tabled;
use tokio::sync::broadcast::error::RecvError;
use trackq_core::config::Config;
use trackq_core::jobs::{JobEvent, JobStatus, Scheduler, SchedulerStatus, Sequencer};
use trackq_core::telemetry::init_metrics;

use crate::manifest::Manifest;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Manifest file (YAML, TOML or JSON)
    pub manifest: PathBuf,

    /// Override the configured concurrency limit
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Override the configured retry limit
    #[arg(long)]
    pub retry_limit: Option<u32>,

    /// Only print the final summary
    #[arg(short, long)]
    pub quiet: bool,
}

/// Summary row for one manifest job.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct JobRow {
    #[tabled(rename = "Job")]
    pub job: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Attempts")]
    pub attempts: u32,
    #[tabled(rename = "Elapsed")]
    pub elapsed: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    jobs: &'a [JobRow],
    scheduler: SchedulerStatus,
}

/// Job rows kept in manifest order and updated from scheduler events.
#[derive(Debug, Default)]
struct Tracker {
    rows: Vec<JobRow>,
    index: HashMap<String, usize>,
}

impl Tracker {
    fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tracker = Self::default();
        for id in ids {
            tracker.index.insert(id.to_string(), tracker.rows.len());
            tracker.rows.push(JobRow {
                job: id.to_string(),
                status: JobStatus::Pending.to_string(),
                attempts: 0,
                elapsed: "-".into(),
                detail: String::new(),
            });
        }
        tracker
    }

    fn row(&mut self, id: &str) -> Option<&mut JobRow> {
        let index = *self.index.get(id)?;
        self.rows.get_mut(index)
    }

    fn apply(&mut self, event: &JobEvent) {
        let Some(id) = event.job_id() else {
            return;
        };
        let Some(row) = self.row(id.as_str()) else {
            return;
        };
        match event {
            JobEvent::Started { attempt, .. } => {
                row.status = JobStatus::Active.to_string();
                row.attempts = *attempt;
            }
            JobEvent::Completed {
                attempt,
                elapsed_ms,
                result,
                ..
            } => {
                row.status = JobStatus::Completed.to_string();
                row.attempts = *attempt;
                row.elapsed = output::format_ms(*elapsed_ms);
                row.detail = playlist_detail(result).unwrap_or_default();
            }
            JobEvent::RetryScheduled { error, .. } => {
                row.status = JobStatus::RetryScheduled.to_string();
                row.detail = error.message.clone();
            }
            JobEvent::Failed {
                attempts, error, ..
            } => {
                row.status = JobStatus::Failed.to_string();
                row.attempts = *attempts;
                row.detail = error.to_string();
            }
            JobEvent::Removed { reason, .. } => {
                row.status = JobStatus::Cancelled.to_string();
                row.detail = reason.as_str().to_string();
            }
            _ => {}
        }
    }

    fn count(&self, status: JobStatus) -> usize {
        let status = status.to_string();
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

/// "4/5 items" for playlist results.
fn playlist_detail(result: &serde_json::Value) -> Option<String> {
    let succeeded = result.get("succeeded")?.as_u64()?;
    let total = result.get("total")?.as_u64()?;
    Some(format!("{}/{} items", succeeded, total))
}

pub async fn execute(args: RunArgs, settings: &Config, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    if manifest.jobs.is_empty() {
        output::print_info("Manifest has no jobs.");
        return Ok(());
    }

    let mut scheduler_config = settings.to_scheduler_config()?;
    if let Some(max_concurrent) = args.max_concurrent {
        scheduler_config.max_concurrent = max_concurrent;
    }
    if let Some(retry_limit) = args.retry_limit {
        scheduler_config.retry_limit = retry_limit;
    }

    let metrics = init_metrics(&settings.metrics)?;
    let scheduler = Scheduler::new(scheduler_config)?;
    let sequencer = Sequencer::new(settings.to_sequencer_config()?)?;
    let mut events = scheduler.subscribe();
    let mut items = sequencer.subscribe();
    let dispatcher = scheduler.spawn_dispatcher()?;
    let verbose = !args.quiet && format == OutputFormat::Table;

    let mut tracker = Tracker::new(manifest.jobs.iter().map(|j| j.id()));
    for entry in &manifest.jobs {
        scheduler.submit(entry.to_spec(&sequencer))?;
    }
    tracing::info!(jobs = manifest.jobs.len(), "Manifest submitted");

    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if verbose {
                        output::print_job_event(&event);
                    }
                    tracker.apply(&event);
                    if matches!(event, JobEvent::QueueEmpty) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    output::print_warning(&format!("Missed {} events", skipped));
                    if scheduler.status().is_idle() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            item = items.recv(), if verbose => {
                if let Ok(item) = item {
                    output::print_sequence_event(&item);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                output::print_warning("Interrupted, cancelling remaining jobs");
                if scheduler.clear(false) == 0 && scheduler.status().is_idle() {
                    break;
                }
            }
        }
    }

    dispatcher.stop().await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Summary");
            output::print_list(&tracker.rows, format)?;
        }
        _ => output::print_item(
            &RunSummary {
                jobs: &tracker.rows,
                scheduler: scheduler.status(),
            },
            format,
        )?,
    }

    if metrics.is_enabled() && format == OutputFormat::Table {
        output::print_header("Metrics");
        print!("{}", metrics.render());
    }

    if interrupted {
        bail!("Run interrupted");
    }
    let failed = tracker.count(JobStatus::Failed);
    if failed > 0 {
        bail!("{} of {} jobs failed", failed, tracker.rows.len());
    }
    if format == OutputFormat::Table {
        output::print_success(&format!(
            "{} jobs completed",
            tracker.count(JobStatus::Completed)
        ));
    }
    Ok(())
}
