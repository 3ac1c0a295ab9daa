// src/core/keyservice/import_service.rs

//! `KeyImportService`: dispatches a plaintext-key bulk import either
//! synchronously or as a tracked background task, per the record count's
//! operation tier. Sync tiers insert and return inline; async tiers start
//! the task before returning so a caller polling `TaskService` immediately
//! after never races an unstarted task.

use crate::core::bulk::{ExecutionMode, OperationTier};
use crate::core::errors::AppResult;
use crate::core::keypool::KeyProvider;
use crate::core::model::TaskKind;
use crate::core::task::TaskService;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum KeyImportOutcome {
    /// The import ran to completion before this call returned.
    Completed { inserted: u64 },
    /// The import was handed off to the background task tracker; poll
    /// `TaskService::get_task_status` for progress.
    Started { total: u64 },
}

pub struct KeyImportService {
    provider: Arc<KeyProvider>,
    tasks: Arc<TaskService>,
}

/// Keys per progress update during an async import — roughly 20 updates
/// across the whole run regardless of total size.
fn chunk_size_for(total: usize) -> usize {
    (total / 20).max(1)
}

async fn run_import_body(provider: Arc<KeyProvider>, tasks: Arc<TaskService>, group_id: i64, keys: Vec<String>) -> AppResult<serde_json::Value> {
    let chunk_size = chunk_size_for(keys.len());
    let mut inserted_total = 0u64;
    for chunk in keys.chunks(chunk_size) {
        let n = provider.add_keys(group_id, chunk).await?;
        inserted_total += n as u64;
        tasks.update_progress(inserted_total);
    }
    Ok(serde_json::json!({ "inserted": inserted_total }))
}

impl KeyImportService {
    pub fn new(provider: Arc<KeyProvider>, tasks: Arc<TaskService>) -> Self {
        Self { provider, tasks }
    }

    pub async fn import_keys(&self, group_id: i64, group_name: &str, plaintext_keys: Vec<String>) -> AppResult<KeyImportOutcome> {
        let tier = OperationTier::for_count(plaintext_keys.len());
        match tier.execution_mode() {
            ExecutionMode::Sync => {
                let inserted = self.provider.add_keys(group_id, &plaintext_keys).await?;
                Ok(KeyImportOutcome::Completed { inserted: inserted as u64 })
            }
            ExecutionMode::Async => {
                let total = plaintext_keys.len() as u64;
                self.tasks.start_task(TaskKind::Import, group_name.to_string(), total)?;

                let provider = Arc::clone(&self.provider);
                let tasks = Arc::clone(&self.tasks);
                tokio::spawn(async move {
                    let handle = tokio::spawn(run_import_body(provider, Arc::clone(&tasks), group_id, plaintext_keys));
                    match handle.await {
                        Ok(Ok(value)) => tasks.end_task(Some(value), None),
                        Ok(Err(e)) => tasks.end_task(None, Some(e.to_string())),
                        Err(join_err) => {
                            let msg = if join_err.is_panic() { "task panicked" } else { "task was cancelled" };
                            tasks.end_task(None, Some(msg.to_string()));
                        }
                    }
                });
                Ok(KeyImportOutcome::Started { total })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_never_zero_for_small_batches() {
        assert_eq!(chunk_size_for(5), 1);
        assert_eq!(chunk_size_for(0), 1);
    }

    #[test]
    fn small_batches_classify_as_sync() {
        assert_eq!(OperationTier::for_count(10).execution_mode(), ExecutionMode::Sync);
    }

    #[test]
    fn huge_batches_classify_as_async() {
        assert_eq!(OperationTier::for_count(50_000).execution_mode(), ExecutionMode::Async);
    }
}
