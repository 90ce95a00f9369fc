#![forbid(unsafe_code)]

//! Task Snapshot: point-in-time inventory of the host's scheduled tasks.
//!
//! One run collects task definitions and runtime state, reads the last seven
//! days of the task-scheduler operational log, correlates the two by task
//! full name, and commits the result as an NDJSON batch for an
//! active-response monitoring pipeline.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use task_snapshot::prelude::*;
//!
//! let config = Config::load(None)?;
//! let logger = DiagnosticLogger::open(LogConfig::from_config(&config));
//! let platform = detect_platform();
//! let report = SnapshotRun::new(platform.as_ref(), &logger, &config).execute()?;
//! println!("{} lines -> {}", report.lines, report.destination.display());
//! # Ok::<(), SnapError>(())
//! ```

pub mod prelude;

pub mod core;
pub mod inventory;
pub mod logger;
pub mod output;
pub mod pipeline;
pub mod platform;
