//! Windows platform: Task Scheduler via PowerShell ScheduledTasks cmdlets,
//! operational history via `Get-WinEvent`, channel state via `wevtutil`.
//!
//! Every PowerShell call emits compact JSON that is parsed entry by entry; a
//! malformed entry is skipped and reported through `drain_diagnostics`.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::process::Command;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::core::errors::{Result, SnapError};
use crate::core::host::local_hostname;
use crate::inventory::model::{TaskAction, TaskState, Trigger, full_task_name};
use crate::platform::pal::{EventFilter, Platform, RawEvent, RawTask, TaskInfo};

const POWERSHELL: &str = "powershell.exe";
const WEVTUTIL: &str = "wevtutil.exe";

const TASK_LISTING_SCRIPT: &str = r"
$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
function ConvertTo-IsoUtc($value) {
    if ($null -eq $value) { return $null }
    try { return ([datetime]$value).ToUniversalTime().ToString('o') } catch { return $null }
}
function Get-Field($object, [string]$name) {
    if ($null -eq $object) { return $null }
    try { return $object.$name } catch { return $null }
}
$rows = foreach ($task in @(Get-ScheduledTask)) {
    $info = $null
    $infoError = $null
    try {
        $i = Get-ScheduledTaskInfo -TaskPath $task.TaskPath -TaskName $task.TaskName -ErrorAction Stop
        $info = [ordered]@{
            LastRunTime = ConvertTo-IsoUtc $i.LastRunTime
            NextRunTime = ConvertTo-IsoUtc $i.NextRunTime
            LastTaskResult = $i.LastTaskResult
        }
    } catch { $infoError = $_.Exception.Message }
    [ordered]@{
        TaskName = $task.TaskName
        TaskPath = $task.TaskPath
        State = [string]$task.State
        Author = Get-Field $task 'Author'
        RunLevel = Get-Field (Get-Field $task 'Principal') 'RunLevel' | ForEach-Object { [string]$_ }
        Triggers = @(foreach ($t in @($task.Triggers)) {
            if ($t) { [ordered]@{ Type = $t.CimClass.CimClassName; StartBoundary = Get-Field $t 'StartBoundary' } }
        })
        Actions = @(foreach ($a in @($task.Actions)) {
            if ($a) { [ordered]@{ Execute = Get-Field $a 'Execute'; Arguments = Get-Field $a 'Arguments'; ClassId = Get-Field $a 'ClassId' } }
        })
        Info = $info
        InfoError = $infoError
    }
}
ConvertTo-Json -InputObject @($rows) -Depth 5 -Compress
";

const EVENT_QUERY_SCRIPT: &str = r"
$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
$start = [datetime]::Parse('{{START}}', [Globalization.CultureInfo]::InvariantCulture, [Globalization.DateTimeStyles]::RoundtripKind)
$filter = @{ LogName = '{{LOG}}'; Id = @({{IDS}}); StartTime = $start }
try {
    $events = @(Get-WinEvent -FilterHashtable $filter -MaxEvents {{MAX}} -ErrorAction Stop)
} catch {
    if ($_.FullyQualifiedErrorId -like 'NoMatchingEventsFound*') { $events = @() } else { throw }
}
$rows = foreach ($e in $events) {
    [ordered]@{
        TimeCreated = $e.TimeCreated.ToUniversalTime().ToString('o')
        Id = $e.Id
        Properties = @(foreach ($p in @($e.Properties)) {
            $v = $p.Value
            if ($null -eq $v) { $null }
            elseif ($v -is [int] -or $v -is [long] -or $v -is [uint32] -or $v -is [uint64] -or $v -is [int16] -or $v -is [uint16] -or $v -is [byte]) { $v }
            else { [string]$v }
        })
    }
}
ConvertTo-Json -InputObject @($rows) -Depth 4 -Compress
";

/// Task Scheduler + event log access through `powershell.exe` and `wevtutil.exe`.
#[derive(Debug, Default)]
pub struct WindowsPlatform {
    /// Runtime info captured during the last listing, keyed by full name.
    info_cache: RwLock<HashMap<String, std::result::Result<TaskInfo, String>>>,
    diagnostics: Mutex<Vec<String>>,
}

impl WindowsPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn note(&self, message: String) {
        self.diagnostics.lock().push(message);
    }
}

impl Platform for WindowsPlatform {
    fn list_tasks(&self) -> Result<Vec<RawTask>> {
        let stdout = run_program("task_scheduler", POWERSHELL, &powershell_args(TASK_LISTING_SCRIPT))?;
        let listing = parse_task_listing(&stdout)?;
        for skipped in listing.skipped {
            self.note(skipped);
        }

        let mut cache = self.info_cache.write();
        cache.clear();
        let mut tasks = Vec::with_capacity(listing.tasks.len());
        for ListedTask { task, info } in listing.tasks {
            cache.insert(task.full_name(), info);
            tasks.push(task);
        }
        Ok(tasks)
    }

    fn task_info(&self, path: &str, name: &str) -> Result<TaskInfo> {
        let full_name = full_task_name(path, name);
        match self.info_cache.read().get(&full_name) {
            Some(Ok(info)) => Ok(info.clone()),
            Some(Err(message)) => Err(SnapError::unavailable("task_scheduler", message.clone())),
            None => Err(SnapError::unavailable(
                "task_scheduler",
                format!("{full_name} not present in the current listing"),
            )),
        }
    }

    fn channel_enabled(&self, channel: &str) -> Result<bool> {
        let stdout = run_program("event_log", WEVTUTIL, &["gl".to_string(), channel.to_string()])?;
        parse_channel_enabled(&stdout).ok_or_else(|| SnapError::SourceParse {
            source_name: "event_log",
            details: format!("no 'enabled:' line in wevtutil output for {channel}"),
        })
    }

    fn enable_channel(&self, channel: &str) -> Result<()> {
        run_program(
            "event_log",
            WEVTUTIL,
            &["sl".to_string(), channel.to_string(), "/e:true".to_string()],
        )
        .map(|_| ())
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>> {
        let script = render_event_query(filter);
        let stdout = run_program("event_log", POWERSHELL, &powershell_args(&script))?;
        let listing = parse_event_listing(&stdout)?;
        for skipped in listing.skipped {
            self.note(skipped);
        }
        Ok(listing.events)
    }

    fn host_name(&self) -> Option<String> {
        local_hostname()
    }

    fn sources(&self) -> Vec<String> {
        vec![
            "Get-ScheduledTask".to_string(),
            "Get-ScheduledTaskInfo".to_string(),
            "Get-WinEvent".to_string(),
        ]
    }

    fn drain_diagnostics(&self) -> Vec<String> {
        std::mem::take(&mut *self.diagnostics.lock())
    }
}

// ──────────────────────── process plumbing ────────────────────────

fn powershell_args(script: &str) -> Vec<String> {
    [
        "-NoProfile",
        "-NonInteractive",
        "-ExecutionPolicy",
        "Bypass",
        "-Command",
        script,
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn run_program(source_name: &'static str, program: &str, args: &[String]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|error| SnapError::unavailable(source_name, format!("cannot run {program}: {error}")))?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SnapError::unavailable(
            source_name,
            format!("{program} exited with {}: {}", output.status, first_line(&stderr)),
        ))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

fn render_event_query(filter: &EventFilter) -> String {
    let ids = filter
        .event_ids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    EVENT_QUERY_SCRIPT
        .replace("{{START}}", &filter.start_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .replace("{{LOG}}", &filter.log_name.replace('\'', "''"))
        .replace("{{IDS}}", &ids)
        .replace("{{MAX}}", &filter.max_events.to_string())
}

// ──────────────────────── payload parsing ────────────────────────

/// Deserialize an optional attribute; a malformed value becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskRow {
    task_name: String,
    task_path: String,
    #[serde(default, deserialize_with = "lenient")]
    state: Option<StateField>,
    #[serde(default, deserialize_with = "lenient")]
    author: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    run_level: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    triggers: Option<Vec<TriggerRow>>,
    #[serde(default, deserialize_with = "lenient")]
    actions: Option<Vec<ActionRow>>,
    #[serde(default, deserialize_with = "lenient")]
    info: Option<InfoRow>,
    #[serde(default, deserialize_with = "lenient")]
    info_error: Option<String>,
}

/// The scheduler reports state either by name or by numeric code.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateField {
    Code(i64),
    Name(String),
}

impl StateField {
    fn resolve(self) -> Option<TaskState> {
        match self {
            Self::Code(code) => Some(TaskState::from_code(code)),
            Self::Name(name) if name.trim().is_empty() => None,
            Self::Name(name) => name.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TriggerRow {
    #[serde(rename = "Type", default, deserialize_with = "lenient")]
    type_code: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    start_boundary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ActionRow {
    #[serde(default, deserialize_with = "lenient")]
    execute: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    arguments: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    class_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InfoRow {
    #[serde(default, deserialize_with = "lenient")]
    last_run_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    next_run_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_task_result: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EventRow {
    time_created: String,
    id: u32,
    #[serde(default, deserialize_with = "lenient")]
    properties: Option<Vec<Value>>,
}

#[derive(Debug)]
struct ListedTask {
    task: RawTask,
    info: std::result::Result<TaskInfo, String>,
}

#[derive(Debug, Default)]
struct TaskListing {
    tasks: Vec<ListedTask>,
    skipped: Vec<String>,
}

#[derive(Debug, Default)]
struct EventListing {
    events: Vec<RawEvent>,
    skipped: Vec<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn parse_entries(source_name: &'static str, stdout: &str) -> Result<Vec<Value>> {
    let trimmed = stdout.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(single @ Value::Object(_)) => Ok(vec![single]),
        Ok(other) => Err(SnapError::SourceParse {
            source_name,
            details: format!("expected a JSON array, got {other}"),
        }),
        Err(error) => Err(SnapError::SourceParse {
            source_name,
            details: error.to_string(),
        }),
    }
}

fn parse_task_listing(stdout: &str) -> Result<TaskListing> {
    let mut listing = TaskListing::default();
    for (index, entry) in parse_entries("task_scheduler", stdout)?.into_iter().enumerate() {
        match serde_json::from_value::<TaskRow>(entry) {
            Ok(row) => listing.tasks.push(row.into_listed()),
            Err(error) => listing
                .skipped
                .push(format!("skipped malformed task entry #{index}: {error}")),
        }
    }
    Ok(listing)
}

impl TaskRow {
    fn into_listed(self) -> ListedTask {
        let info = match (self.info, self.info_error) {
            (Some(row), _) => Ok(TaskInfo {
                // The info cmdlet carries no state; the definition's state is the fallback.
                state: None,
                last_run_time: row.last_run_time.as_deref().and_then(parse_utc),
                next_run_time: row.next_run_time.as_deref().and_then(parse_utc),
                last_task_result: row.last_task_result,
            }),
            (None, Some(message)) => Err(message),
            (None, None) => Err("no runtime info returned".to_string()),
        };

        let triggers = self
            .triggers
            .unwrap_or_default()
            .into_iter()
            .map(|t| {
                Trigger::new(
                    t.type_code.unwrap_or_else(|| "Unknown".to_string()),
                    non_blank(t.start_boundary),
                )
            })
            .collect();
        let actions = self
            .actions
            .unwrap_or_default()
            .into_iter()
            .map(|a| TaskAction {
                execute: non_blank(a.execute),
                arguments: non_blank(a.arguments),
                class_id: non_blank(a.class_id),
            })
            .collect();

        ListedTask {
            task: RawTask {
                name: self.task_name,
                path: self.task_path,
                state: self.state.and_then(StateField::resolve),
                author: non_blank(self.author),
                run_level: non_blank(self.run_level),
                triggers,
                actions,
            },
            info,
        }
    }
}

fn parse_event_listing(stdout: &str) -> Result<EventListing> {
    let mut listing = EventListing::default();
    for (index, entry) in parse_entries("event_log", stdout)?.into_iter().enumerate() {
        let row = match serde_json::from_value::<EventRow>(entry) {
            Ok(row) => row,
            Err(error) => {
                listing
                    .skipped
                    .push(format!("skipped malformed event entry #{index}: {error}"));
                continue;
            }
        };
        let Some(time_created) = parse_utc(&row.time_created) else {
            listing.skipped.push(format!(
                "skipped event entry #{index}: unreadable TimeCreated {:?}",
                row.time_created
            ));
            continue;
        };
        listing.events.push(RawEvent {
            time_created,
            event_id: row.id,
            properties: row.properties.unwrap_or_default(),
        });
    }
    Ok(listing)
}

/// Parse a round-trip (`'o'`) timestamp; values without an offset are UTC.
fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Read `enabled: true|false` from `wevtutil gl` output.
fn parse_channel_enabled(stdout: &str) -> Option<bool> {
    stdout.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("enabled") {
            value.trim().parse::<bool>().ok()
        } else {
            None
        }
    })
}
