//! `trackq validate`: check a manifest without running anything.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;
use trackq_core::config::Config;
use trackq_core::jobs::{JobId, JobPriority, Scheduler, Sequencer};

use crate::manifest::Manifest;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Manifest file (YAML, TOML or JSON)
    pub manifest: PathBuf,
}

/// One job in the order the scheduler would start it.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct PlanRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Job")]
    pub job: String,
    #[tabled(rename = "Priority")]
    pub priority: u8,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Timeout")]
    pub timeout: String,
}

pub async fn execute(args: ValidateArgs, settings: &Config, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let config = settings.to_scheduler_config()?;
    let default_timeout = config.default_timeout();
    let levels = config.priority_levels;
    let default_priority = i64::from(config.default_priority);

    // Submitting to a paused scheduler yields the real admission order.
    let scheduler = Scheduler::new(config)?;
    let sequencer = Sequencer::new(settings.to_sequencer_config()?)?;
    scheduler.pause();
    for entry in &manifest.jobs {
        scheduler.submit(entry.to_spec(&sequencer))?;
    }

    let mut rows: Vec<PlanRow> = manifest
        .jobs
        .iter()
        .map(|entry| {
            let id = JobId::from(entry.id());
            PlanRow {
                position: scheduler.position_of(&id).unwrap_or_default() + 1,
                job: entry.id().to_string(),
                priority: JobPriority::clamped(
                    entry.priority.unwrap_or(default_priority),
                    levels,
                )
                .value(),
                kind: entry.kind(),
                timeout: match (&entry.playlist, entry.timeout) {
                    (Some(_), None) => "per item".to_string(),
                    (_, timeout) => {
                        output::format_ms(timeout.unwrap_or(default_timeout).as_millis() as u64)
                    }
                },
            }
        })
        .collect();
    rows.sort_by_key(|r| r.position);
    scheduler.clear(false);

    output::print_list(&rows, format)?;
    if format == OutputFormat::Table {
        output::print_success(&format!(
            "{} is valid ({} jobs)",
            args.manifest.display(),
            rows.len()
        ));
    }
    Ok(())
}
