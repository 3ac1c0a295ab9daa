// src/core/keyservice/key_service.rs

//! `KeyService`: thin CRUD wrapping `KeyProvider` for single-key and
//! paginated operations that don't need tier-based dispatch or task
//! tracking (that belongs to `KeyImportService`/`KeyDeleteService`).

use crate::core::errors::AppResult;
use crate::core::keypool::repo as key_repo;
use crate::core::keypool::KeyProvider;
use crate::core::model::ApiKey;
use std::sync::Arc;

pub struct KeyService {
    provider: Arc<KeyProvider>,
}

impl KeyService {
    pub fn new(provider: Arc<KeyProvider>) -> Self {
        Self { provider }
    }

    pub async fn add_keys(&self, group_id: i64, plaintext_keys: &[String]) -> AppResult<usize> {
        self.provider.add_keys(group_id, plaintext_keys).await
    }

    /// Offset-paginated listing, independent of the in-memory active-key
    /// working set (includes invalid keys too).
    pub async fn list_keys_page(&self, group_id: i64, offset: i64, limit: i64) -> AppResult<Vec<ApiKey>> {
        key_repo::fetch_keys_page(self.provider.pool(), self.provider.dialect(), group_id, offset, limit).await
    }

    pub async fn remove_keys(&self, group_id: i64, ids: &[i64]) -> AppResult<u64> {
        self.provider.remove_keys(group_id, ids).await
    }

    pub async fn restore_keys(&self, group_id: i64, ids: &[i64]) -> AppResult<u64> {
        self.provider.restore_keys(group_id, ids).await
    }

    pub async fn restore_all_invalid_keys(&self, group_id: i64) -> AppResult<u64> {
        self.provider.restore_multiple_keys(group_id).await
    }

    pub fn select_key(&self, group_id: i64, blacklist_threshold: u32) -> AppResult<ApiKey> {
        self.provider.select_key(group_id, blacklist_threshold)
    }

    pub fn record_success(&self, group_id: i64, key_id: i64) {
        self.provider.record_success(group_id, key_id);
    }

    pub fn record_failure(&self, group_id: i64, key_id: i64, blacklist_threshold: u32) {
        self.provider.record_failure(group_id, key_id, blacklist_threshold);
    }
}
