#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::Value;
use task_snapshot::core::config::Config;
use task_snapshot::inventory::model::{TaskAction, TaskState, Trigger};
use task_snapshot::platform::pal::{RawEvent, RawTask, TaskInfo};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_tasksnap") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "tasksnap.exe" } else { "tasksnap" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve tasksnap binary path for integration test"),
    }
}

/// Run the binary with `args` plus extra env vars; transcript kept for debugging.
pub fn run_cli_case(case_name: &str, args: &[&str], envs: &[(&str, &Path)]) -> CmdResult {
    let root = std::env::temp_dir().join("tasksnap-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for (name, value) in envs {
        command.env(name, value);
    }
    let output = command.output().expect("execute tasksnap command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──── fixtures ────

/// Fixed clock for scenario runs.
pub fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

/// Config whose every path lives under `dir`; console echo off.
pub fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.output_file = dir.join("active-response").join("active-responses.log");
    config.paths.log_file = dir.join("list-scheduled-tasks.log");
    config.paths.scratch_dir = Some(dir.join("scratch"));
    config.logging.console = false;
    config
}

pub fn task(path: &str, name: &str) -> RawTask {
    RawTask {
        name: name.to_string(),
        path: path.to_string(),
        state: Some(TaskState::Ready),
        author: Some("Contoso".to_string()),
        run_level: Some("Limited".to_string()),
        triggers: vec![Trigger::new(
            "MSFT_TaskDailyTrigger",
            Some("2026-01-01T03:00:00".to_string()),
        )],
        actions: vec![TaskAction {
            execute: Some("C:\\Tools\\job.exe".to_string()),
            arguments: Some("--run".to_string()),
            class_id: None,
        }],
    }
}

pub fn info(last_result: i64) -> TaskInfo {
    TaskInfo {
        state: None,
        last_run_time: Some(run_time() - TimeDelta::hours(9)),
        next_run_time: Some(run_time() + TimeDelta::hours(15)),
        last_task_result: Some(last_result),
    }
}

/// Event for `full_name`, `minutes_ago` before the run.
pub fn event(full_name: &str, event_id: u32, minutes_ago: i64, result: Value) -> RawEvent {
    RawEvent {
        time_created: run_time() - TimeDelta::minutes(minutes_ago),
        event_id,
        properties: vec![Value::from(full_name), result],
    }
}

/// Parse every line of an NDJSON file, asserting the line-level contract.
pub fn read_records(path: &Path) -> Vec<Value> {
    let raw = fs::read_to_string(path).expect("read output file");
    assert!(raw.is_ascii(), "output must be ASCII");
    assert!(raw.ends_with('\n'), "output must end with a newline");
    raw.lines()
        .map(|line| serde_json::from_str(line).expect("each line is one JSON document"))
        .collect()
}

pub fn items<'a>(records: &'a [Value], item: &str) -> Vec<&'a Value> {
    records.iter().filter(|r| r["item"] == item).collect()
}
