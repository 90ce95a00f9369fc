//! Top-level CLI definition and dispatch.

use std::path::PathBuf;

use clap::Parser;
use colored::control;
use thiserror::Error;

use task_snapshot::core::config::Config;
use task_snapshot::core::errors::SnapError;
use task_snapshot::logger::{DiagnosticLogger, LogConfig};
use task_snapshot::pipeline::{RunOutcome, SnapshotRun};
use task_snapshot::platform::pal::detect_platform;

/// Scheduled task inventory and run history as NDJSON.
#[derive(Debug, Parser)]
#[command(
    name = "tasksnap",
    author,
    version,
    about = "Scheduled task inventory snapshot for active-response pipelines",
    long_about = None
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Diagnostic log file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// NDJSON output file (active-response log).
    #[arg(long, value_name = "PATH")]
    output_file: Option<PathBuf>,
    /// Process at most N tasks (0 = unlimited).
    #[arg(long, value_name = "N")]
    max_tasks: Option<usize>,
    /// Action tag stamped on records.
    #[arg(long, value_name = "NAME")]
    action: Option<String>,
    /// Do not echo diagnostic lines to the console.
    #[arg(short, long)]
    quiet: bool,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(SnapError),
    /// Neither the batch nor the error record could be written.
    #[error("{0}")]
    Runtime(SnapError),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Runtime(_) => 1,
        }
    }
}

/// Dispatch the CLI.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let config = resolve_config(cli).map_err(CliError::Config)?;
    let logger = DiagnosticLogger::open(LogConfig::from_config(&config));
    let platform = detect_platform();

    let report = SnapshotRun::new(platform.as_ref(), &logger, &config)
        .execute()
        .map_err(CliError::Runtime)?;
    if report.outcome == RunOutcome::Failed {
        logger.warn(format!(
            "Run ended with an error record at {}",
            report.destination.display()
        ));
    }
    Ok(())
}

/// File + env config, then command-line flags on top.
fn resolve_config(cli: &Cli) -> Result<Config, SnapError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = &cli.log_file {
        config.paths.log_file.clone_from(path);
    }
    if let Some(path) = &cli.output_file {
        config.paths.output_file.clone_from(path);
    }
    if let Some(max) = cli.max_tasks {
        config.collection.max_tasks = max;
    }
    if let Some(action) = &cli.action {
        config.output.action.clone_from(action);
    }
    if cli.quiet {
        config.logging.console = false;
    }
    config.validate()?;
    Ok(config)
}
