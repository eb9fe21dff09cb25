//! Configuration management commands.
//!
//! The default configuration file lives at `~/.trackq/config.toml`.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;
use trackq_core::config::Config;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Target file (defaults to ~/.trackq/config.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Return the path to the default configuration file (`~/.trackq/config.toml`).
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".trackq").join("config.toml"))
}

/// Write `content` to `path`, creating the directory if needed.
fn write_config(path: &PathBuf, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

pub async fn execute(cmd: ConfigCommands, settings: &Config, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => match format {
            OutputFormat::Table => {
                let scheduler = settings.to_scheduler_config()?;
                let sequencer = settings.to_sequencer_config()?;

                output::print_header("Scheduler");
                output::print_detail("max_concurrent", &scheduler.max_concurrent.to_string());
                output::print_detail("retry_limit", &scheduler.retry_limit.to_string());
                output::print_detail("retry_delay", &output::format_ms(scheduler.retry_delay_ms));
                output::print_detail(
                    "priority_levels",
                    &format!(
                        "{} (default {})",
                        scheduler.priority_levels, scheduler.default_priority
                    ),
                );
                output::print_detail(
                    "dispatch_interval",
                    &output::format_ms(scheduler.dispatch_interval_ms),
                );
                output::print_detail(
                    "default_timeout",
                    &output::format_ms(scheduler.default_timeout_ms),
                );
                output::print_detail("backoff", &serde_json::to_string(&scheduler.backoff)?);

                output::print_header("Sequencer");
                output::print_detail(
                    "inter_item_delay",
                    &output::format_ms(sequencer.inter_item_delay_ms),
                );
                output::print_detail("retry_limit", &sequencer.retry_limit.to_string());
                output::print_detail("retry_delay", &output::format_ms(sequencer.retry_delay_ms));
                output::print_detail("item_timeout", &output::format_ms(sequencer.item_timeout_ms));

                output::print_header("Logging");
                output::print_detail("level", &settings.logging.level);
            }
            _ => output::print_item(settings, format)?,
        },

        ConfigCommands::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => config_path()?,
            };
            let content = Config::default().to_toml()?;

            if write_config(&path, &content, force)? {
                output::print_success(&format!("Wrote {}", path.display()));
            } else {
                output::print_info(&format!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                ));
            }
        }
    }

    Ok(())
}
