// src/core/keyservice/delete_service.rs

//! `KeyDeleteService`: bulk key removal tracked through `TaskService`.
//! Removing an entire group's keys is capped at a 5-minute timeout so a
//! stuck statement (e.g. sqlite's single-writer lock contended by another
//! long bulk insert) can't leave the task slot wedged forever.

use crate::core::errors::{AppError, AppResult};
use crate::core::keypool::KeyProvider;
use crate::core::model::TaskKind;
use crate::core::task::TaskService;
use std::sync::Arc;
use std::time::Duration;

const REMOVE_ALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub struct KeyDeleteService {
    provider: Arc<KeyProvider>,
    tasks: Arc<TaskService>,
}

impl KeyDeleteService {
    pub fn new(provider: Arc<KeyProvider>, tasks: Arc<TaskService>) -> Self {
        Self { provider, tasks }
    }

    pub async fn remove_all_keys(&self, group_id: i64, group_name: &str) -> AppResult<u64> {
        self.tasks.start_task(TaskKind::Delete, group_name.to_string(), 0)?;
        let outcome = tokio::time::timeout(REMOVE_ALL_TIMEOUT, self.provider.remove_all_keys(group_id)).await;
        match outcome {
            Ok(Ok(removed)) => {
                self.tasks.end_task(Some(serde_json::json!({ "removed": removed })), None);
                Ok(removed)
            }
            Ok(Err(e)) => {
                self.tasks.end_task(None, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                let msg = format!("remove-all-keys for '{group_name}' timed out after {REMOVE_ALL_TIMEOUT:?}");
                self.tasks.end_task(None, Some(msg.clone()));
                Err(AppError::Transient(msg))
            }
        }
    }

    pub async fn remove_invalid_keys(&self, group_id: i64, group_name: &str) -> AppResult<u64> {
        self.tasks.start_task(TaskKind::Delete, group_name.to_string(), 0)?;
        match self.provider.remove_invalid_keys(group_id).await {
            Ok(removed) => {
                self.tasks.end_task(Some(serde_json::json!({ "removed": removed })), None);
                Ok(removed)
            }
            Err(e) => {
                self.tasks.end_task(None, Some(e.to_string()));
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_five_minutes() {
        assert_eq!(REMOVE_ALL_TIMEOUT, Duration::from_secs(300));
    }
}
