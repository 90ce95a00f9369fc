//! History source adapter: time-windowed slice of the task-scheduler
//! operational log.
//!
//! The channel is switched on before querying when it is found disabled.
//! Every failure here is downgraded to a WARN; history is best-effort
//! enrichment and an empty result is legitimate.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use crate::inventory::model::HistoryEvent;
use crate::logger::DiagnosticLogger;
use crate::platform::pal::{EventFilter, OPERATIONAL_LOG, Platform, RawEvent};

/// Task lifecycle event ids: started, start failed, completed, action
/// failures, triggered, terminated, process created, action start/complete.
pub const WATCHED_EVENT_IDS: [u32; 11] = [100, 101, 102, 103, 107, 110, 111, 129, 200, 201, 203];

/// How far back history is read.
pub const LOOKBACK_DAYS: i64 = 7;

/// Reads task history from a [`Platform`].
pub struct HistoryCollector<'a> {
    platform: &'a dyn Platform,
    logger: &'a DiagnosticLogger,
    max_events: usize,
}

impl<'a> HistoryCollector<'a> {
    #[must_use]
    pub fn new(platform: &'a dyn Platform, logger: &'a DiagnosticLogger, max_events: usize) -> Self {
        Self {
            platform,
            logger,
            max_events,
        }
    }

    /// Enable the operational channel if it is off. Failures are warnings only.
    pub fn ensure_operational_log_enabled(&self) {
        match self.platform.channel_enabled(OPERATIONAL_LOG) {
            Ok(true) => self.logger.debug(format!("{OPERATIONAL_LOG} already enabled")),
            Ok(false) => {
                self.logger
                    .info(format!("{OPERATIONAL_LOG} is disabled; enabling it"));
                if let Err(e) = self.platform.enable_channel(OPERATIONAL_LOG) {
                    self.logger
                        .warn(format!("Could not enable {OPERATIONAL_LOG}: {e}"));
                }
            }
            Err(e) => self
                .logger
                .warn(format!("Could not check state of {OPERATIONAL_LOG}: {e}")),
        }
    }

    /// Filter covering the lookback window ending at `now`.
    #[must_use]
    pub fn filter(&self, now: DateTime<Utc>) -> EventFilter {
        EventFilter {
            log_name: OPERATIONAL_LOG.to_string(),
            event_ids: WATCHED_EVENT_IDS.to_vec(),
            start_time: now - TimeDelta::days(LOOKBACK_DAYS),
            max_events: self.max_events,
        }
    }

    /// Query the log. Never fails; a query error yields no events.
    pub fn query_events(&self, filter: &EventFilter) -> Vec<HistoryEvent> {
        let events = match self.platform.query_events(filter) {
            Ok(raw) => raw.into_iter().map(history_event).collect(),
            Err(e) => {
                self.logger
                    .warn(format!("Task history query failed, continuing without history: {e}"));
                Vec::new()
            }
        };
        for note in self.platform.drain_diagnostics() {
            self.logger.warn(note);
        }
        self.logger.info(format!(
            "Loaded {} history events since {}",
            events.len(),
            filter.start_time.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        events
    }
}

/// Lift positional payload fields 0 (task full name) and 1 (result).
#[must_use]
pub fn history_event(raw: RawEvent) -> HistoryEvent {
    let mut properties = raw.properties.into_iter();
    let task_full_name = match properties.next() {
        Some(Value::String(name)) => Some(name),
        _ => None,
    };
    let result = properties.next().filter(|v| !v.is_null());
    HistoryEvent {
        time_created: raw.time_created,
        event_id: raw.event_id,
        task_full_name,
        result,
    }
}
