// src/core/task/service.rs

//! `TaskService`: the process-wide single-slot long-running task tracker
//!.

use crate::core::errors::{AppError, AppResult};
use crate::core::model::{TaskKind, TaskStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Exactly one task may be running process-wide at a time. A single `RwLock` is enough: writers (`start_task`,
/// `update_progress`, `end_task`) are always called from the one owning
/// task, readers (`get_task_status`, status-endpoint callers) are many and
/// never block the owner for long.
pub struct TaskService {
    state: RwLock<Option<TaskStatus>>,
}

impl TaskService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: RwLock::new(None) })
    }

    /// Fails with `AlreadyRunning` if another task has `is_running = true`.
    pub fn start_task(&self, task_type: TaskKind, group_name: impl Into<String>, total: u64) -> AppResult<TaskStatus> {
        let mut state = self.state.write();
        if let Some(existing) = state.as_ref() {
            if existing.is_running {
                return Err(AppError::AlreadyRunning(format!(
                    "a {} task is already running for group '{}'",
                    existing.task_type, existing.group_name
                )));
            }
        }
        let status = TaskStatus::new(task_type, group_name.into(), total);
        *state = Some(status.clone());
        Ok(status)
    }

    /// A no-op when no task is running.
    pub fn update_progress(&self, processed: u64) {
        let mut state = self.state.write();
        if let Some(status) = state.as_mut() {
            if status.is_running {
                status.processed = processed;
            }
        }
    }

    pub fn end_task(&self, result: Option<serde_json::Value>, error: Option<String>) {
        let mut state = self.state.write();
        if let Some(status) = state.as_mut() {
            if status.is_running {
                let now = Utc::now();
                status.finished_at = Some(now);
                status.duration_seconds = Some((now - status.started_at).num_milliseconds() as f64 / 1000.0);
                status.result = result;
                status.error = error;
                status.is_running = false;
            }
        }
    }

    pub fn get_task_status(&self) -> Option<TaskStatus> {
        self.state.read().clone()
    }
}

/// Runs `body` as a tracked task: starts it, spawns it on its own tokio
/// task so a panic cannot take down the caller, and always ends the task
/// with an error if `body` returned one, panicked, or was cancelled.
/// Orphaned running states are never left behind.
pub async fn run_guarded<F, Fut>(
    service: &Arc<TaskService>,
    task_type: TaskKind,
    group_name: String,
    total: u64,
    body: F,
) -> AppResult<serde_json::Value>
where
    F: FnOnce(Arc<TaskService>) -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<serde_json::Value>> + Send + 'static,
{
    service.start_task(task_type, group_name, total)?;
    let svc_for_body = Arc::clone(service);
    let handle = tokio::spawn(async move { body(svc_for_body).await });

    match handle.await {
        Ok(Ok(result)) => {
            service.end_task(Some(result.clone()), None);
            Ok(result)
        }
        Ok(Err(e)) => {
            service.end_task(None, Some(e.to_string()));
            Err(e)
        }
        Err(join_err) => {
            let msg = if join_err.is_panic() {
                "task panicked".to_string()
            } else {
                "task was cancelled".to_string()
            };
            error!("tracked task ended abnormally: {msg}");
            service.end_task(None, Some(msg.clone()));
            Err(AppError::internal(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_fails_while_first_is_running() {
        let service = TaskService::new();
        service.start_task(TaskKind::Import, "g1", 100).unwrap();
        let err = service.start_task(TaskKind::Delete, "g2", 10).unwrap_err();
        assert!(matches!(err, AppError::AlreadyRunning(_)));
    }

    #[test]
    fn start_succeeds_again_after_end() {
        let service = TaskService::new();
        service.start_task(TaskKind::Import, "g1", 100).unwrap();
        service.end_task(None, None);
        assert!(service.start_task(TaskKind::Restore, "g2", 5).is_ok());
    }

    #[test]
    fn update_and_end_are_noops_without_a_running_task() {
        let service = TaskService::new();
        service.update_progress(42);
        service.end_task(None, None);
        assert!(service.get_task_status().is_none());
    }

    #[test]
    fn end_task_computes_duration_from_start() {
        let service = TaskService::new();
        service.start_task(TaskKind::Import, "g1", 100).unwrap();
        service.end_task(Some(serde_json::json!({"ok": true})), None);
        let status = service.get_task_status().unwrap();
        assert!(!status.is_running);
        assert!(status.duration_seconds.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn run_guarded_recovers_from_a_panicking_body() {
        let service = TaskService::new();
        let result = run_guarded(&service, TaskKind::Import, "g1".into(), 10, |_svc| async move {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok(serde_json::Value::Null)
        })
        .await;
        assert!(result.is_err());
        let status = service.get_task_status().unwrap();
        assert!(!status.is_running);
        assert!(status.error.is_some());
    }
}
