//! PAL trait for the OS task scheduler and event log, plus the in-memory mock.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::errors::{Result, SnapError};
use crate::inventory::model::{TaskAction, TaskState, Trigger, full_task_name};

/// Task-scheduler operational channel.
pub const OPERATIONAL_LOG: &str = "Microsoft-Windows-TaskScheduler/Operational";

/// A task definition as listed by the scheduler, before runtime info is merged.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTask {
    pub name: String,
    pub path: String,
    /// State cached on the definition object itself.
    pub state: Option<TaskState>,
    pub author: Option<String>,
    pub run_level: Option<String>,
    pub triggers: Vec<Trigger>,
    pub actions: Vec<TaskAction>,
}

impl RawTask {
    #[must_use]
    pub fn full_name(&self) -> String {
        full_task_name(&self.path, &self.name)
    }
}

/// Runtime info for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub state: Option<TaskState>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_task_result: Option<i64>,
}

/// Event-log query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub log_name: String,
    pub event_ids: Vec<u32>,
    pub start_time: DateTime<Utc>,
    pub max_events: usize,
}

/// One raw event: creation time, id, and positional payload values.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub time_created: DateTime<Utc>,
    pub event_id: u32,
    pub properties: Vec<Value>,
}

/// OS abstraction used by the collectors. All calls are blocking.
pub trait Platform: Send + Sync {
    fn list_tasks(&self) -> Result<Vec<RawTask>>;
    fn task_info(&self, path: &str, name: &str) -> Result<TaskInfo>;
    fn channel_enabled(&self, channel: &str) -> Result<bool>;
    fn enable_channel(&self, channel: &str) -> Result<()>;
    fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>>;
    fn host_name(&self) -> Option<String>;
    /// Names of the underlying facilities, reported in the `verify_source` record.
    fn sources(&self) -> Vec<String>;
    /// Per-entry problems noticed while parsing source payloads since the last call.
    fn drain_diagnostics(&self) -> Vec<String> {
        Vec::new()
    }
}

/// In-memory mock implementation for deterministic tests.
#[derive(Debug, Default)]
pub struct MockPlatform {
    tasks: Option<Vec<RawTask>>,
    infos: HashMap<String, TaskInfo>,
    events: Option<Vec<RawEvent>>,
    channel_enabled: Option<bool>,
    host: Option<String>,
    enable_calls: Mutex<Vec<String>>,
    queries: Mutex<Vec<EventFilter>>,
}

impl MockPlatform {
    /// Empty, healthy platform: no tasks, no events, channel enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Some(Vec::new()),
            events: Some(Vec::new()),
            channel_enabled: Some(true),
            host: Some("MOCKHOST".to_string()),
            ..Self::default()
        }
    }

    /// Add a task together with its runtime info.
    #[must_use]
    pub fn with_task(mut self, task: RawTask, info: Option<TaskInfo>) -> Self {
        if let Some(info) = info {
            self.infos.insert(task.full_name(), info);
        }
        self.tasks.get_or_insert_with(Vec::new).push(task);
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Vec<RawEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Make `list_tasks` fail.
    #[must_use]
    pub fn failing_task_listing(mut self) -> Self {
        self.tasks = None;
        self
    }

    /// Make `query_events` fail.
    #[must_use]
    pub fn failing_event_query(mut self) -> Self {
        self.events = None;
        self
    }

    /// `Some(false)` = disabled channel; `None` = state cannot be read.
    #[must_use]
    pub fn with_channel_state(mut self, enabled: Option<bool>) -> Self {
        self.channel_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: Option<&str>) -> Self {
        self.host = host.map(str::to_string);
        self
    }

    /// Channels passed to `enable_channel` so far.
    #[must_use]
    pub fn enable_calls(&self) -> Vec<String> {
        self.enable_calls.lock().clone()
    }

    /// Filters passed to `query_events` so far.
    #[must_use]
    pub fn queries(&self) -> Vec<EventFilter> {
        self.queries.lock().clone()
    }
}

impl Platform for MockPlatform {
    fn list_tasks(&self) -> Result<Vec<RawTask>> {
        self.tasks
            .clone()
            .ok_or_else(|| SnapError::unavailable("task_scheduler", "mock listing failure"))
    }

    fn task_info(&self, path: &str, name: &str) -> Result<TaskInfo> {
        self.infos
            .get(&full_task_name(path, name))
            .cloned()
            .ok_or_else(|| SnapError::unavailable("task_scheduler", format!("no info for {path}{name}")))
    }

    fn channel_enabled(&self, channel: &str) -> Result<bool> {
        self.channel_enabled
            .ok_or_else(|| SnapError::unavailable("event_log", format!("cannot read {channel}")))
    }

    fn enable_channel(&self, channel: &str) -> Result<()> {
        self.enable_calls.lock().push(channel.to_string());
        Ok(())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>> {
        self.queries.lock().push(filter.clone());
        self.events
            .clone()
            .ok_or_else(|| SnapError::unavailable("event_log", "access is denied"))
    }

    fn host_name(&self) -> Option<String> {
        self.host.clone()
    }

    fn sources(&self) -> Vec<String> {
        vec!["mock:task_scheduler".to_string(), "mock:event_log".to_string()]
    }
}

/// Active platform implementation. The Windows adapter is returned on every
/// OS; where its programs are missing each call reports the source as
/// unavailable and the run degrades to an empty inventory.
#[must_use]
pub fn detect_platform() -> Arc<dyn Platform> {
    Arc::new(crate::platform::windows::WindowsPlatform::new())
}
