//! End-to-end snapshot runs against the in-memory platform.

mod common;

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use serde_json::Value;
use task_snapshot::core::config::DEFAULT_ACTION;
use task_snapshot::core::errors::{Result, SnapError};
use task_snapshot::logger::{DiagnosticLogger, LogConfig};
use task_snapshot::output::sink::{BatchWriter, DurableSink, SinkOutcome};
use task_snapshot::pipeline::{RunOutcome, SnapshotRun};
use task_snapshot::platform::pal::{MockPlatform, OPERATIONAL_LOG};

use common::{config_in, event, info, items, read_records, run_time, task};

#[test]
fn two_tasks_three_events_yield_eight_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new()
        .with_task(task("\\Vendor\\", "A"), Some(info(0)))
        .with_task(task("\\", "B"), Some(info(1)))
        .with_events(vec![
            event("\\Vendor\\A", 100, 30, Value::Null),
            event("\\Vendor\\A", 102, 10, Value::from(0)),
            event("\\Vendor\\A", 201, 20, Value::from("0x0")),
        ]);

    let report = SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.lines, 8);

    let records = read_records(&config.paths.output_file);
    assert_eq!(records.len(), 8);
    let kinds: Vec<&str> = records.iter().map(|r| r["item"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        ["config", "verify_source", "summary", "task", "history", "history", "history", "task"]
    );

    let summary = items(&records, "summary")[0];
    assert_eq!(summary["task_count"], 2);
    assert_eq!(summary["events_loaded"], 3);

    let history = items(&records, "history");
    assert!(history.iter().all(|h| h["full_name"] == "\\Vendor\\A"));
    assert!(history.iter().all(|h| h["action"] == "scheduled_task_history"));
    let ids: Vec<u64> = history.iter().map(|h| h["event_id"].as_u64().unwrap()).collect();
    assert_eq!(ids, [102, 201, 100], "newest first");
    assert_eq!(history[0]["result"], 0);
    assert_eq!(history[1]["result"], "0x0");
    assert!(history[2]["result"].is_null());

    for record in &records {
        assert_eq!(record["copilot_action"], true);
        assert_eq!(record["host"], "MOCKHOST");
        assert!(record["timestamp"].as_str().unwrap().ends_with('Z'));
        if record["item"] != "history" {
            assert_eq!(record["action"], DEFAULT_ACTION);
            assert_eq!(record["timestamp"], "2026-10-19T12:00:00Z");
        }
    }
}

#[test]
fn task_records_carry_full_field_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let mut sparse = task("\\Sparse\\", "NoInfo");
    sparse.author = None;
    sparse.run_level = None;
    let platform = MockPlatform::new()
        .with_task(task("\\Microsoft\\Windows\\Defrag\\", "ScheduledDefrag"), Some(info(267_011)))
        .with_task(sparse, None);

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    let records = read_records(&config.paths.output_file);
    let tasks = items(&records, "task");

    let full = tasks[0];
    assert_eq!(full["full_name"], "\\Microsoft\\Windows\\Defrag\\ScheduledDefrag");
    assert_eq!(full["task_name"], "ScheduledDefrag");
    assert_eq!(full["path"], "\\Microsoft\\Windows\\Defrag\\");
    assert_eq!(full["state"], "Ready");
    assert_eq!(full["last_run_time"], "2026-10-19T03:00:00Z");
    assert_eq!(full["next_run_time"], "2026-10-20T03:00:00Z");
    assert_eq!(full["last_task_result"], 267_011);
    assert_eq!(full["author"], "Contoso");
    assert_eq!(full["run_level"], "Limited");
    assert_eq!(full["triggers"], "MSFT_TaskDailyTrigger @ 2026-01-01T03:00:00 [Daily]");
    assert_eq!(full["actions"], "C:\\Tools\\job.exe --run");

    let sparse = tasks[1].as_object().unwrap();
    for key in ["last_run_time", "next_run_time", "last_task_result", "author", "run_level"] {
        assert!(sparse.contains_key(key), "{key} must be present");
        assert!(sparse[key].is_null(), "{key} must be null");
    }
    assert_eq!(sparse["state"], "Ready");
}

#[test]
fn task_listing_failure_is_a_graceful_empty_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new()
        .failing_task_listing()
        .with_events(vec![event("\\A", 102, 5, Value::from(0))]);

    let report = SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let records = read_records(&config.paths.output_file);
    let kinds: Vec<&str> = records.iter().map(|r| r["item"].as_str().unwrap()).collect();
    assert_eq!(kinds, ["config", "verify_source", "summary"]);
    assert_eq!(records[2]["task_count"], 0);
}

#[test]
fn event_query_failure_keeps_tasks_without_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new()
        .with_task(task("\\", "A"), Some(info(0)))
        .with_task(task("\\", "B"), Some(info(0)))
        .failing_event_query();

    let report = SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);

    let records = read_records(&config.paths.output_file);
    assert_eq!(items(&records, "summary")[0]["events_loaded"], 0);
    assert_eq!(items(&records, "task").len(), 2);
    assert!(items(&records, "history").is_empty());
    assert!(items(&records, "error").is_empty());
}

#[test]
fn task_cap_emits_first_n_and_warns() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.collection.max_tasks = 2;
    let logger = DiagnosticLogger::open(LogConfig::from_config(&config));
    let mut platform = MockPlatform::new();
    for name in ["T1", "T2", "T3", "T4", "T5"] {
        platform = platform.with_task(task("\\", name), Some(info(0)));
    }

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    let records = read_records(&config.paths.output_file);
    let names: Vec<&str> = items(&records, "task")
        .iter()
        .map(|t| t["task_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["T1", "T2"]);
    assert_eq!(items(&records, "summary")[0]["task_count"], 2);

    let diag = fs::read_to_string(&config.paths.log_file).unwrap();
    assert!(diag.contains("[WARN] Task cap reached: processing first 2 of 5 tasks"));
    assert!(diag.contains("[INFO] Snapshot finished in"));
}

#[test]
fn history_is_exact_match_capped_at_five() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let mut events: Vec<_> = (0..7)
        .map(|i| event("\\Jobs\\Nightly", 102, 60 * (i + 1), Value::from(i)))
        .collect();
    events.push(event("\\jobs\\nightly", 102, 1, Value::Null));
    events.push(event("\\Jobs/Nightly", 102, 2, Value::Null));
    events.push(event("\\Nightly", 102, 3, Value::Null));
    let platform = MockPlatform::new()
        .with_task(task("\\Jobs\\", "Nightly"), Some(info(0)))
        .with_events(events);

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    let records = read_records(&config.paths.output_file);
    let history = items(&records, "history");
    assert_eq!(history.len(), 5);
    let results: Vec<i64> = history.iter().map(|h| h["result"].as_i64().unwrap()).collect();
    assert_eq!(results, [0, 1, 2, 3, 4]);
    let stamps: Vec<&str> = history.iter().map(|h| h["timestamp"].as_str().unwrap()).collect();
    assert!(stamps.windows(2).all(|w| w[0] > w[1]));
    assert_eq!(items(&records, "summary")[0]["events_loaded"], 10);
}

#[test]
fn verify_source_echoes_the_history_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.collection.history_max_events = 123;
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new();

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    let records = read_records(&config.paths.output_file);
    let verify = items(&records, "verify_source")[0];
    assert_eq!(verify["sources"][0], "mock:task_scheduler");
    assert_eq!(verify["events_filter"]["logName"], OPERATIONAL_LOG);
    assert_eq!(verify["events_filter"]["startTime"], "2026-10-12T12:00:00Z");
    assert!(verify["events_filter"]["eventIds"].as_array().unwrap().contains(&Value::from(102)));

    let queries = platform.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].max_events, 123);
}

#[test]
fn disabled_operational_log_is_enabled_before_query() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new().with_channel_state(Some(false));

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    assert_eq!(platform.enable_calls(), [OPERATIONAL_LOG]);
    assert_eq!(platform.queries().len(), 1);
}

#[test]
fn locked_primary_output_lands_in_new_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::open(LogConfig::from_config(&config));
    // A non-empty directory at the output path stands in for a locked file.
    let blocker = config.paths.output_file.join("reader.lock");
    fs::create_dir_all(blocker.parent().unwrap()).unwrap();
    fs::write(&blocker, b"held").unwrap();
    let platform = MockPlatform::new().with_task(task("\\", "A"), Some(info(0)));

    let report = SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    assert!(report.used_fallback);
    let mut alternate = config.paths.output_file.clone().into_os_string();
    alternate.push(".new");
    assert_eq!(report.destination.as_os_str(), alternate.as_os_str());
    assert_eq!(read_records(&report.destination).len(), 4);
    assert_eq!(fs::read(&blocker).unwrap(), b"held");

    let diag = fs::read_to_string(&config.paths.log_file).unwrap();
    assert!(diag.contains("[INFO] Primary output"));
}

#[test]
fn unusable_scratch_dir_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    let scratch_file = dir.path().join("not-a-dir");
    fs::write(&scratch_file, b"").unwrap();
    config.paths.scratch_dir = Some(scratch_file);
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new();

    let err = SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap_err();
    assert_eq!(err.code(), "SNAP-3002");
    assert!(!config.paths.output_file.exists());
}

#[test]
fn host_override_and_action_flow_into_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.output.host = Some("WS-0042".to_string());
    config.output.action = "inventory_sweep".to_string();
    let logger = DiagnosticLogger::detached(false);
    let platform = MockPlatform::new()
        .with_task(task("\\", "A"), Some(info(0)))
        .with_events(vec![event("\\A", 102, 1, Value::from(0))]);

    SnapshotRun::new(&platform, &logger, &config)
        .execute_at(run_time())
        .unwrap();
    let records = read_records(&config.paths.output_file);
    assert!(records.iter().all(|r| r["host"] == "WS-0042"));
    assert_eq!(items(&records, "task")[0]["action"], "inventory_sweep");
    assert_eq!(items(&records, "history")[0]["action"], "scheduled_task_history");
}

/// File sink whose first commit fails, as if the batch write itself broke.
struct FailingFirstCommit {
    inner: DurableSink,
    batches: RefCell<Vec<usize>>,
}

impl BatchWriter for FailingFirstCommit {
    fn write_batch(&self, lines: &[String], path: &Path) -> Result<SinkOutcome> {
        let first = self.batches.borrow().is_empty();
        self.batches.borrow_mut().push(lines.len());
        if first {
            return Err(SnapError::io(path, std::io::Error::other("output locked by reader")));
        }
        self.inner.write_batch(lines, path)
    }
}

#[test]
fn escaping_failure_replaces_batch_with_single_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let logger = DiagnosticLogger::open(LogConfig::from_config(&config));
    let platform = MockPlatform::new()
        .with_task(task("\\", "A"), Some(info(0)))
        .with_events(vec![event("\\A", 102, 1, Value::from(0))]);
    let writer = FailingFirstCommit {
        inner: DurableSink::new(config.paths.scratch_dir.clone()),
        batches: RefCell::new(Vec::new()),
    };

    let report = SnapshotRun::new(&platform, &logger, &config)
        .with_writer(&writer)
        .execute_at(run_time())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.lines, 1);
    assert_eq!(*writer.batches.borrow(), [5, 1]);

    let records = read_records(&config.paths.output_file);
    assert_eq!(records.len(), 1);
    let error = records[0].as_object().unwrap();
    assert_eq!(error["item"], "error");
    assert_eq!(error["timestamp"], "2026-10-19T12:00:00Z");
    assert_eq!(error["host"], "MOCKHOST");
    assert_eq!(error["action"], DEFAULT_ACTION);
    assert_eq!(error["copilot_action"], true);
    let message = error["error"].as_str().unwrap();
    assert!(message.contains("SNAP-3002"));
    assert!(message.contains("output locked by reader"));
    assert_eq!(report.error.as_deref(), Some(message));
    let mut keys: Vec<&str> = error.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["action", "copilot_action", "error", "host", "item", "timestamp"]);

    let diag = fs::read_to_string(&config.paths.log_file).unwrap();
    assert!(diag.contains("[ERROR] Snapshot failed: [SNAP-3002]"));
    assert!(diag.contains("[INFO] Snapshot finished in"));
}
