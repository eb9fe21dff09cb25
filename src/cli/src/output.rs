//! Output formatting utilities for the trackq CLI.
//!
//! Supports table, JSON, and YAML output formats.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};
use trackq_core::jobs::{JobEvent, SequenceEvent, SubItemStatus};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

/// Print a success message to stdout.
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Print a warning to stderr.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// Print an informational message to stdout.
pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}

/// Print a list of items in the requested format.
pub fn print_list<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No results found.".dimmed());
                return Ok(());
            }
            let table = Table::new(items)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::left()))
                .to_string();
            println!("{}", table);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
    }
    Ok(())
}

/// Print a single item in the requested format.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item)?)
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
    }
    Ok(())
}

/// Print key-value details to the terminal (non-JSON/YAML output).
pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// One progress line for a scheduler event.
pub fn print_job_event(event: &JobEvent) {
    match event {
        JobEvent::Added { job_id, priority, .. } => {
            println!("{} {} (priority {})", "queued".dimmed(), job_id, priority)
        }
        JobEvent::Started {
            job_id,
            attempt,
            max_attempts,
            ..
        } => println!(
            "{} {} (attempt {}/{})",
            "started".blue(),
            job_id,
            attempt,
            max_attempts
        ),
        JobEvent::Completed {
            job_id, elapsed_ms, ..
        } => println!("{} {} in {}", "done".green(), job_id, format_ms(*elapsed_ms)),
        JobEvent::RetryScheduled {
            job_id,
            attempt,
            max_attempts,
            delay_ms,
            error,
            ..
        } => println!(
            "{} {} attempt {}/{} failed: {} (retrying in {})",
            "retry".yellow(),
            job_id,
            attempt,
            max_attempts,
            error.message,
            format_ms(*delay_ms)
        ),
        JobEvent::Failed {
            job_id,
            attempts,
            error,
            ..
        } => println!(
            "{} {} after {} attempt(s): {}",
            "failed".red().bold(),
            job_id,
            attempts,
            error.message
        ),
        JobEvent::Removed { job_id, reason, .. } => {
            println!("{} {} ({})", "removed".magenta(), job_id, reason.as_str())
        }
        JobEvent::QueueEmpty => {}
        JobEvent::Paused => println!("{}", "paused".yellow()),
        JobEvent::Resumed => println!("{}", "resumed".yellow()),
    }
}

/// One progress line for a playlist event.
pub fn print_sequence_event(event: &SequenceEvent) {
    match event {
        SequenceEvent::ItemCompleted {
            composite_id,
            item_id,
            status,
            progress,
            ..
        } => {
            let label = match status {
                SubItemStatus::Completed => "item done".green(),
                SubItemStatus::Failed => "item failed".red(),
                SubItemStatus::Cancelled => "item cancelled".magenta(),
            };
            println!("  {} {}/{} [{}%]", label, composite_id, item_id, progress);
        }
        SequenceEvent::ItemRetryScheduled {
            composite_id,
            item_id,
            attempt,
            max_attempts,
            error,
            ..
        } => println!(
            "  {} {}/{} attempt {}/{}: {}",
            "item retry".yellow(),
            composite_id,
            item_id,
            attempt,
            max_attempts,
            error.message
        ),
        SequenceEvent::ItemStarted { .. } | SequenceEvent::Completed { .. } => {}
    }
}

/// Render milliseconds for humans.
pub fn format_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
