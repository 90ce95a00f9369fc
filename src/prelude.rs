//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use task_snapshot::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SnapError};

// Logging
pub use crate::logger::{DiagnosticLogger, Level, LogConfig};

// Platform
pub use crate::platform::pal::{MockPlatform, Platform, detect_platform};

// Inventory
pub use crate::inventory::correlate::match_history;
pub use crate::inventory::model::{HistoryEvent, ScheduledTaskSnapshot, TaskState, TriggerKind};

// Output + driver
pub use crate::output::{BatchWriter, DurableSink, OutputRecord, RecordBuilder, to_iso8601};
pub use crate::pipeline::{RunOutcome, RunReport, SnapshotRun};
