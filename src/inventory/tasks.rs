//! Task source adapter: list definitions, merge runtime info, build snapshots.
//!
//! Listing failure degrades to an empty inventory. Info failure for one task
//! degrades that task only: its state falls back to the definition's cached
//! state, then to `Unknown`, and its run times/result become null.

use crate::inventory::model::{ScheduledTaskSnapshot, TaskState};
use crate::logger::DiagnosticLogger;
use crate::platform::pal::{Platform, RawTask, TaskInfo};

/// Collects scheduled-task snapshots from a [`Platform`].
pub struct TaskCollector<'a> {
    platform: &'a dyn Platform,
    logger: &'a DiagnosticLogger,
    max_tasks: usize,
}

impl<'a> TaskCollector<'a> {
    /// `max_tasks == 0` means unlimited.
    #[must_use]
    pub fn new(platform: &'a dyn Platform, logger: &'a DiagnosticLogger, max_tasks: usize) -> Self {
        Self {
            platform,
            logger,
            max_tasks,
        }
    }

    /// List task definitions, applying the cap. Never fails.
    pub fn list_tasks(&self) -> Vec<RawTask> {
        let mut tasks = match self.platform.list_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                self.logger
                    .warn(format!("Scheduled task listing unavailable, continuing with none: {e}"));
                Vec::new()
            }
        };
        for note in self.platform.drain_diagnostics() {
            self.logger.warn(note);
        }

        if self.max_tasks > 0 && tasks.len() > self.max_tasks {
            self.logger.warn(format!(
                "Task cap reached: processing first {} of {} tasks",
                self.max_tasks,
                tasks.len()
            ));
            tasks.truncate(self.max_tasks);
        }
        self.logger.info(format!("Listed {} scheduled tasks", tasks.len()));
        tasks
    }

    /// Runtime info for one task; `None` when the source cannot provide it.
    pub fn task_info(&self, task: &RawTask) -> Option<TaskInfo> {
        match self.platform.task_info(&task.path, &task.name) {
            Ok(info) => Some(info),
            Err(e) => {
                self.logger
                    .warn(format!("Task info unavailable for {}: {e}", task.full_name()));
                None
            }
        }
    }

    /// Fetch info for `task` and merge it into a snapshot.
    pub fn snapshot(&self, task: RawTask) -> ScheduledTaskSnapshot {
        let info = self.task_info(&task);
        build_snapshot(task, info)
    }
}

/// Merge a definition with its (optional) runtime info.
#[must_use]
pub fn build_snapshot(task: RawTask, info: Option<TaskInfo>) -> ScheduledTaskSnapshot {
    let full_name = task.full_name();
    let info = info.unwrap_or_default();
    let state = info.state.or(task.state).unwrap_or(TaskState::Unknown);
    ScheduledTaskSnapshot {
        task_name: task.name,
        task_path: task.path,
        full_name,
        state,
        last_run_time: info.last_run_time,
        next_run_time: info.next_run_time,
        last_task_result: info.last_task_result,
        author: task.author,
        run_level: task.run_level,
        triggers: task.triggers,
        actions: task.actions,
    }
}
