//! Snapshot driver: collect, correlate, render, commit.
//!
//! Linear run: enable log -> list tasks -> query history -> preamble ->
//! per-task task + history records -> write batch. Source failures are
//! absorbed by the collectors. Anything that still escapes is caught here
//! once and replaces the batch with a single `error` record.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::inventory::correlate::{MAX_HISTORY_PER_TASK, match_history};
use crate::inventory::history::{HistoryCollector, LOOKBACK_DAYS};
use crate::inventory::model::{HistoryEvent, ScheduledTaskSnapshot};
use crate::inventory::tasks::TaskCollector;
use crate::logger::DiagnosticLogger;
use crate::output::record::RecordBuilder;
use crate::output::sink::{BatchWriter, DurableSink, SinkOutcome};
use crate::platform::pal::Platform;

/// Host name used when neither config nor platform provides one.
pub const UNKNOWN_HOST: &str = "unknown";

/// Text of the `config` preamble record.
#[must_use]
pub fn config_note() -> String {
    format!(
        "Scheduled task inventory with up to {MAX_HISTORY_PER_TASK} recent operational events per task ({LOOKBACK_DAYS}-day window)"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Task batch written.
    Completed,
    /// Error record written in place of the batch.
    Failed,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub lines: usize,
    pub destination: PathBuf,
    pub used_fallback: bool,
    /// Message of the failure that replaced the batch.
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// One snapshot run over a platform.
pub struct SnapshotRun<'a> {
    platform: &'a dyn Platform,
    logger: &'a DiagnosticLogger,
    config: &'a Config,
    sink: Box<dyn BatchWriter + 'a>,
}

impl<'a> SnapshotRun<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn Platform, logger: &'a DiagnosticLogger, config: &'a Config) -> Self {
        Self {
            platform,
            logger,
            config,
            sink: Box::new(DurableSink::new(config.paths.scratch_dir.clone())),
        }
    }

    /// Commit batches through `writer` instead of the file sink.
    #[must_use]
    pub fn with_writer(mut self, writer: impl BatchWriter + 'a) -> Self {
        self.sink = Box::new(writer);
        self
    }

    /// Host identity: config override, then platform, then `"unknown"`.
    #[must_use]
    pub fn host(&self) -> String {
        self.config
            .output
            .host
            .clone()
            .or_else(|| self.platform.host_name())
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string())
    }

    /// Run at the current time.
    pub fn execute(&self) -> Result<RunReport> {
        self.execute_at(Utc::now())
    }

    /// Run with `now` as the record timestamp and end of the history window.
    ///
    /// Returns `Err` only when even the error record could not be written.
    pub fn execute_at(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let started = Instant::now();
        let host = self.host();
        self.logger.info(format!(
            "Starting scheduled task snapshot on {host} (action={})",
            self.config.output.action
        ));
        let builder = RecordBuilder::new(host, self.config.output.action.as_str(), now);

        let result = self.run(&builder, now);
        let elapsed = started.elapsed();
        self.logger
            .info(format!("Snapshot finished in {:.3}s", elapsed.as_secs_f64()));
        self.logger.flush();
        result.map(|mut report| {
            report.elapsed = elapsed;
            report
        })
    }

    fn run(&self, builder: &RecordBuilder, now: DateTime<Utc>) -> Result<RunReport> {
        let target = &self.config.paths.output_file;
        let attempt = self
            .collect(builder, now)
            .and_then(|lines| self.sink.write_batch(&lines, target));
        match attempt {
            Ok(outcome) => {
                self.note_outcome(&outcome);
                Ok(report(RunOutcome::Completed, outcome, None))
            }
            Err(e) => {
                let message = e.to_string();
                self.logger.error(format!("Snapshot failed: {message}"));
                let line = builder.error(message.as_str()).to_line()?;
                let outcome = self.sink.write_batch(&[line], target).inspect_err(|write_err| {
                    self.logger
                        .error(format!("Could not write error record: {write_err}"));
                })?;
                self.note_outcome(&outcome);
                Ok(report(RunOutcome::Failed, outcome, Some(message)))
            }
        }
    }

    /// Build every line of the batch, preamble first.
    fn collect(&self, builder: &RecordBuilder, now: DateTime<Utc>) -> Result<Vec<String>> {
        let history =
            HistoryCollector::new(self.platform, self.logger, self.config.collection.history_max_events);
        let collector = TaskCollector::new(self.platform, self.logger, self.config.collection.max_tasks);

        history.ensure_operational_log_enabled();
        let tasks = collector.list_tasks();
        let filter = history.filter(now);
        let events = history.query_events(&filter);

        let mut lines = vec![
            builder.config(config_note()).to_line()?,
            builder.verify_source(self.platform.sources(), &filter).to_line()?,
            builder.summary(tasks.len(), events.len()).to_line()?,
        ];

        let mut history_lines = 0usize;
        for task in tasks {
            let snapshot = collector.snapshot(task);
            lines.push(builder.task(&snapshot).to_line()?);
            match render_history(builder, &snapshot, &events) {
                Ok(rendered) => {
                    history_lines += rendered.len();
                    lines.extend(rendered);
                }
                Err(e) => self.logger.warn(format!(
                    "History correlation failed for {}: {e}",
                    snapshot.full_name
                )),
            }
        }
        self.logger.info(format!(
            "Rendered {} records ({history_lines} history)",
            lines.len()
        ));
        Ok(lines)
    }

    fn note_outcome(&self, outcome: &SinkOutcome) {
        if let Some(reason) = &outcome.primary_error {
            self.logger.info(format!(
                "Primary output {} not writable ({reason}); wrote {} instead",
                self.config.paths.output_file.display(),
                outcome.destination.display()
            ));
        }
        self.logger.info(format!(
            "Wrote {} lines to {}",
            outcome.lines,
            outcome.destination.display()
        ));
    }
}

/// Correlated history lines for one task; all or nothing.
fn render_history(
    builder: &RecordBuilder,
    snapshot: &ScheduledTaskSnapshot,
    events: &[HistoryEvent],
) -> Result<Vec<String>> {
    match_history(events, &snapshot.full_name)
        .iter()
        .map(|event| builder.history(snapshot, event).to_line())
        .collect()
}

fn report(outcome: RunOutcome, sink: SinkOutcome, error: Option<String>) -> RunReport {
    RunReport {
        outcome,
        lines: sink.lines,
        destination: sink.destination,
        used_fallback: sink.used_fallback,
        error,
        elapsed: Duration::ZERO,
    }
}
