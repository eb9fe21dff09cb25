//! trackq CLI - runs download job manifests through the trackq scheduler.
//!
//! Provides commands for running and validating manifests and for managing
//! configuration.

mod commands;
mod manifest;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trackq_core::config::Config;
use trackq_core::TrackqError;
use trackq_core::telemetry::init_logging;

use commands::{config, run, validate};
use output::OutputFormat;

/// trackq - priority job runner for audio downloads
#[derive(Parser)]
#[command(
    name = "trackq",
    version = "0.1.0",
    about = "trackq - priority job runner for audio downloads",
    long_about = "Runs download manifests with bounded concurrency, priorities, retries and \
                  serial playlist processing.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "TRACKQ_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job of a manifest and wait for the queue to drain
    Run(run::RunArgs),

    /// Check a manifest and show the order its jobs would start in
    Validate(validate::ValidateArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let result = match load_config(&cli) {
        Ok(settings) => match cli.command {
            Commands::Run(args) => run::execute(args, &settings, format).await,
            Commands::Validate(args) => validate::execute(args, &settings, format).await,
            Commands::Config(cmd) => config::execute(cmd, &settings, format).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }

    Ok(())
}

/// Resolve configuration and start logging.
///
/// Uses `--config` when given, otherwise `~/.trackq/config.toml` if it exists,
/// otherwise environment variables only.
fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| config::config_path().ok().filter(|p| p.exists()));
    let mut settings = Config::load_from(path.as_deref())?;

    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    init_logging(&settings.logging)?;
    Ok(settings)
}

/// Print a command failure, with the suggested action when the engine gave one.
fn report(error: &anyhow::Error) {
    output::print_error(&format!("{:#}", error));
    let engine_error = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<TrackqError>());
    if let Some(engine_error) = engine_error {
        engine_error.log();
        if let Some(hint) = &engine_error.details().suggested_action {
            output::print_info(hint);
        }
    }
}
