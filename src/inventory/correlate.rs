//! Correlate operational-log events to the task they describe.

use crate::inventory::model::HistoryEvent;

/// Most recent events kept per task.
pub const MAX_HISTORY_PER_TASK: usize = 5;

/// Events whose payload task name equals `full_name` exactly, newest first,
/// capped at [`MAX_HISTORY_PER_TASK`]. No case or separator normalization.
#[must_use]
pub fn match_history(events: &[HistoryEvent], full_name: &str) -> Vec<HistoryEvent> {
    let mut matched: Vec<HistoryEvent> = events
        .iter()
        .filter(|e| e.task_full_name.as_deref() == Some(full_name))
        .cloned()
        .collect();
    // Stable sort keeps source order among equal timestamps.
    matched.sort_by(|a, b| b.time_created.cmp(&a.time_created));
    matched.truncate(MAX_HISTORY_PER_TASK);
    matched
}
