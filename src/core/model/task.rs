// src/core/model/task.rs

//! The process-wide singleton `TaskStatus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of long-running operation a task tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Import,
    Delete,
    Restore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Distinguishes one run from the next so a dashboard that cached an
    /// earlier `TaskStatus` can tell a superseding task apart from a stale
    /// read of the same one, even though both occupy the same process-wide
    /// slot in sequence.
    pub id: Uuid,
    pub task_type: TaskKind,
    pub group_name: String,
    pub total: u64,
    pub processed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub is_running: bool,
}

impl TaskStatus {
    pub fn new(task_type: TaskKind, group_name: String, total: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            group_name,
            total,
            processed: 0,
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: None,
            result: None,
            error: None,
            is_running: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_tasks_get_distinct_ids() {
        let a = TaskStatus::new(TaskKind::Import, "g1".into(), 10);
        let b = TaskStatus::new(TaskKind::Import, "g1".into(), 10);
        assert_ne!(a.id, b.id);
    }
}
