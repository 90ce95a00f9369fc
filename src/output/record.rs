//! NDJSON output records: a shared envelope plus one body per `item` kind.
//!
//! Optional fields serialize as `null`, never omitted; consumers rely on a
//! stable field set. Lines are compact JSON escaped to pure ASCII.

#![allow(missing_docs)]

use std::io;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;

use crate::core::errors::{Result, SnapError};
use crate::inventory::model::{HistoryEvent, ScheduledTaskSnapshot};
use crate::platform::pal::EventFilter;

/// Action tag carried by `history` records.
pub const HISTORY_ACTION: &str = "scheduled_task_history";

/// Output timestamp layout.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One emitted line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub timestamp: String,
    pub host: String,
    pub action: String,
    pub copilot_action: bool,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl OutputRecord {
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Serialize to one ASCII-only compact JSON line (no trailing newline).
    pub fn to_line(&self) -> Result<String> {
        to_ascii_json(self)
    }
}

/// Variant-specific fields, discriminated by `item`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum RecordBody {
    Config {
        note: String,
    },
    VerifySource {
        sources: Vec<String>,
        events_filter: EventsFilter,
    },
    Summary {
        task_count: usize,
        events_loaded: usize,
    },
    Task(TaskRecord),
    History(HistoryRecord),
    Error {
        error: String,
    },
}

/// Echo of the history query filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsFilter {
    pub log_name: String,
    pub event_ids: Vec<u32>,
    pub start_time: Option<String>,
}

impl From<&EventFilter> for EventsFilter {
    fn from(filter: &EventFilter) -> Self {
        Self {
            log_name: filter.log_name.clone(),
            event_ids: filter.event_ids.clone(),
            start_time: to_iso8601(Some(filter.start_time)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    pub task_name: String,
    pub full_name: String,
    pub path: String,
    pub state: String,
    pub last_run_time: Option<String>,
    pub next_run_time: Option<String>,
    pub last_task_result: Option<i64>,
    pub author: Option<String>,
    pub run_level: Option<String>,
    pub triggers: String,
    pub actions: String,
}

impl From<&ScheduledTaskSnapshot> for TaskRecord {
    fn from(task: &ScheduledTaskSnapshot) -> Self {
        Self {
            task_name: task.task_name.clone(),
            full_name: task.full_name.clone(),
            path: task.task_path.clone(),
            state: task.state.to_string(),
            last_run_time: to_iso8601(task.last_run_time),
            next_run_time: to_iso8601(task.next_run_time),
            last_task_result: task.last_task_result,
            author: task.author.clone(),
            run_level: task.run_level.clone(),
            triggers: task.triggers_display(),
            actions: task.actions_display(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub task_name: String,
    pub full_name: String,
    pub path: String,
    pub event_id: u32,
    pub result: Option<Value>,
}

/// Stamps envelopes: fixed host and default action, one clock reading per run.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    host: String,
    action: String,
    timestamp: String,
}

impl RecordBuilder {
    #[must_use]
    pub fn new(host: impl Into<String>, action: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            host: host.into(),
            action: action.into(),
            timestamp: now.format(ISO_FORMAT).to_string(),
        }
    }

    /// Wrap `body` in an envelope with the builder's defaults.
    #[must_use]
    pub fn build(&self, body: RecordBody) -> OutputRecord {
        OutputRecord {
            timestamp: self.timestamp.clone(),
            host: self.host.clone(),
            action: self.action.clone(),
            copilot_action: true,
            body,
        }
    }

    #[must_use]
    pub fn config(&self, note: impl Into<String>) -> OutputRecord {
        self.build(RecordBody::Config { note: note.into() })
    }

    #[must_use]
    pub fn verify_source(&self, sources: Vec<String>, filter: &EventFilter) -> OutputRecord {
        self.build(RecordBody::VerifySource {
            sources,
            events_filter: filter.into(),
        })
    }

    #[must_use]
    pub fn summary(&self, task_count: usize, events_loaded: usize) -> OutputRecord {
        self.build(RecordBody::Summary {
            task_count,
            events_loaded,
        })
    }

    #[must_use]
    pub fn task(&self, task: &ScheduledTaskSnapshot) -> OutputRecord {
        self.build(RecordBody::Task(task.into()))
    }

    /// History records carry their own action tag and the event's time.
    #[must_use]
    pub fn history(&self, task: &ScheduledTaskSnapshot, event: &HistoryEvent) -> OutputRecord {
        let record = self
            .build(RecordBody::History(HistoryRecord {
                task_name: task.task_name.clone(),
                full_name: task.full_name.clone(),
                path: task.task_path.clone(),
                event_id: event.event_id,
                result: event.result.clone(),
            }))
            .with_action(HISTORY_ACTION);
        match to_iso8601(Some(event.time_created)) {
            Some(ts) => record.with_timestamp(ts),
            None => record,
        }
    }

    #[must_use]
    pub fn error(&self, error: impl Into<String>) -> OutputRecord {
        self.build(RecordBody::Error {
            error: error.into(),
        })
    }
}

/// `YYYY-MM-DDTHH:MM:SSZ` for genuine dates (year after 1900), else `None`.
///
/// Known gap: the scheduler's "never run" value (1999-11-30) passes the year
/// test and is emitted as a date. Extra sentinels belong here, not in the
/// source adapters, so every timestamp field stays consistent.
#[must_use]
pub fn to_iso8601(value: Option<DateTime<Utc>>) -> Option<String> {
    value
        .filter(|dt| dt.year() > 1900)
        .map(|dt| dt.format(ISO_FORMAT).to_string())
}

/// Compact JSON with every non-ASCII code point written as `\uXXXX`.
pub fn to_ascii_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::with_capacity(256);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| SnapError::Serialization {
        context: "ascii_json",
        details: e.to_string(),
    })
}

// ──── helpers ────

/// Compact formatter that escapes non-ASCII text.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
