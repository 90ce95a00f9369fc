//! Snapshot domain types: one scheduled task, its triggers/actions, and
//! the operational-log events correlated to it.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Separator used when joining triggers or actions into one display string.
pub const DISPLAY_SEPARATOR: &str = "; ";

/// Runtime state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    #[default]
    Unknown,
    Disabled,
    Queued,
    Ready,
    Running,
}

impl TaskState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Disabled => "Disabled",
            Self::Queued => "Queued",
            Self::Ready => "Ready",
            Self::Running => "Running",
        }
    }

    /// Map the scheduler's numeric state code.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Disabled,
            2 => Self::Queued,
            3 => Self::Ready,
            4 => Self::Running,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i64>() {
            return Ok(Self::from_code(code));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "disabled" => Self::Disabled,
            "queued" => Self::Queued,
            "ready" => Self::Ready,
            "running" => Self::Running,
            _ => Self::Unknown,
        })
    }
}

/// Category of a trigger, mapped from the scheduler's trigger type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Time,
    Daily,
    Weekly,
    Monthly,
    Logon,
    Boot,
    Idle,
    Event,
    Registration,
    SessionStateChange,
    Other,
}

impl TriggerKind {
    /// Explicit mapping from the CIM class name the scheduler reports.
    #[must_use]
    pub fn from_type_code(code: &str) -> Self {
        match code {
            "MSFT_TaskTimeTrigger" => Self::Time,
            "MSFT_TaskDailyTrigger" => Self::Daily,
            "MSFT_TaskWeeklyTrigger" => Self::Weekly,
            "MSFT_TaskMonthlyTrigger" | "MSFT_TaskMonthlyDOWTrigger" => Self::Monthly,
            "MSFT_TaskLogonTrigger" => Self::Logon,
            "MSFT_TaskBootTrigger" => Self::Boot,
            "MSFT_TaskIdleTrigger" => Self::Idle,
            "MSFT_TaskEventTrigger" => Self::Event,
            "MSFT_TaskRegistrationTrigger" => Self::Registration,
            "MSFT_TaskSessionStateChangeTrigger" => Self::SessionStateChange,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "Time",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Logon => "Logon",
            Self::Boot => "Boot",
            Self::Idle => "Idle",
            Self::Event => "Event",
            Self::Registration => "Registration",
            Self::SessionStateChange => "SessionStateChange",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trigger of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Type code exactly as the source reported it.
    pub type_code: String,
    pub kind: TriggerKind,
    /// Start boundary as written in the task definition.
    pub start: Option<String>,
}

impl Trigger {
    #[must_use]
    pub fn new(type_code: impl Into<String>, start: Option<String>) -> Self {
        let type_code = type_code.into();
        let kind = TriggerKind::from_type_code(&type_code);
        Self {
            type_code,
            kind,
            start: start.filter(|s| !s.trim().is_empty()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_code)?;
        if let Some(start) = &self.start {
            write!(f, " @ {start}")?;
        }
        write!(f, " [{}]", self.kind)
    }
}

/// One action of a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskAction {
    pub execute: Option<String>,
    pub arguments: Option<String>,
    /// COM handler class id, for actions without an executable.
    pub class_id: Option<String>,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.execute, &self.class_id) {
            (Some(exe), _) => {
                f.write_str(exe)?;
                if let Some(args) = self.arguments.as_deref().filter(|a| !a.trim().is_empty()) {
                    write!(f, " {args}")?;
                }
                Ok(())
            }
            (None, Some(class_id)) => write!(f, "com:{class_id}"),
            (None, None) => Ok(()),
        }
    }
}

/// Point-in-time view of one scheduled task.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTaskSnapshot {
    pub task_name: String,
    pub task_path: String,
    /// `task_path + task_name`; the correlation key.
    pub full_name: String,
    pub state: TaskState,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_task_result: Option<i64>,
    pub author: Option<String>,
    pub run_level: Option<String>,
    pub triggers: Vec<Trigger>,
    pub actions: Vec<TaskAction>,
}

impl ScheduledTaskSnapshot {
    /// Triggers joined into one display string.
    #[must_use]
    pub fn triggers_display(&self) -> String {
        join_display(&self.triggers)
    }

    /// Actions joined into one display string; empty renderings are dropped.
    #[must_use]
    pub fn actions_display(&self) -> String {
        join_display(&self.actions)
    }
}

/// Concatenate path and name without inserting a separator.
#[must_use]
pub fn full_task_name(path: &str, name: &str) -> String {
    format!("{path}{name}")
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(DISPLAY_SEPARATOR)
}

/// One task-scheduler operational log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    pub time_created: DateTime<Utc>,
    pub event_id: u32,
    /// Payload position 0.
    pub task_full_name: Option<String>,
    /// Payload position 1.
    pub result: Option<Value>,
}
