// src/core/keypool/provider.rs

//! `KeyProvider`: the per-process key pool.

use super::persister::{self, PendingUpdate};
use super::repo;
use super::store::KeyStore;
use crate::config::Dialect;
use crate::core::crypto::CryptoBox;
use crate::core::db::DbPool;
use crate::core::errors::{AppError, AppResult};
use crate::core::model::{ApiKey, KeyStatus};
use crate::core::select::weighted_choice;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The key pool provider. One instance is shared process-wide; callers
/// dispatching a request pass in the owning group's `blacklist_threshold`
/// (from `Group.config`) rather than `KeyProvider` depending on
/// `GroupManager` directly, to avoid a cyclic module dependency.
pub struct KeyProvider {
    pool: DbPool,
    dialect: Dialect,
    crypto: Arc<dyn CryptoBox>,
    store: KeyStore,
    pending_tx: mpsc::UnboundedSender<PendingUpdate>,
    shutdown: CancellationToken,
}

impl KeyProvider {
    pub fn new(pool: DbPool, dialect: Dialect, crypto: Arc<dyn CryptoBox>) -> Arc<Self> {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        persister::spawn(pool.clone(), dialect, pending_rx, shutdown.clone());
        Arc::new(Self {
            pool,
            dialect,
            crypto,
            store: KeyStore::new(),
            pending_tx,
            shutdown,
        })
    }

    /// Exposes the shared pool/dialect/crypto collaborators to sibling
    /// services (`ImportExportService`, `KeyService` family, topology) that
    /// need to bulk-insert or decrypt without duplicating `KeyProvider`'s
    /// construction.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn crypto(&self) -> &Arc<dyn CryptoBox> {
        &self.crypto
    }

    /// Populates the in-memory working set for a group from the database
    ///.
    pub async fn load_group_keys_to_store(&self, group_id: i64) -> AppResult<()> {
        let keys = repo::fetch_active_keys(&self.pool, self.dialect, group_id).await?;
        self.store.load(group_id, keys);
        Ok(())
    }

    /// Encrypts and inserts new keys, skipping any whose hash already exists
    /// in the group.
    pub async fn add_keys(&self, group_id: i64, plaintext_keys: &[String]) -> AppResult<usize> {
        let existing = repo::fetch_existing_hashes(&self.pool, self.dialect, group_id).await?;
        let mut inserted = 0usize;
        let mut seen = existing;
        let mut tx = self.pool.begin().await?;
        for plaintext in plaintext_keys {
            let hash = self.crypto.hash(plaintext);
            if !seen.insert(hash.clone()) {
                continue;
            }
            let ciphertext = self.crypto.encrypt(plaintext)?;
            let sql = format!(
                "INSERT INTO {} (group_id, key_value, key_hash, status, failure_count) VALUES ({}, {}, {}, 'active', 0)",
                crate::core::db::schema::API_KEYS_TABLE,
                crate::core::db::placeholder::placeholder(self.dialect, 1),
                crate::core::db::placeholder::placeholder(self.dialect, 2),
                crate::core::db::placeholder::placeholder(self.dialect, 3),
            );
            sqlx::query(&sql)
                .bind(group_id)
                .bind(ciphertext)
                .bind(hash)
                .execute(&mut *tx)
                .await?;
            inserted += 1;
        }
        tx.commit().await?;
        if inserted > 0 {
            self.load_group_keys_to_store(group_id).await?;
        }
        Ok(inserted)
    }

    pub async fn remove_keys(&self, group_id: i64, ids: &[i64]) -> AppResult<u64> {
        let affected = repo::delete_keys(&self.pool, self.dialect, group_id, ids).await?;
        self.store.remove(group_id, ids);
        Ok(affected)
    }

    pub async fn remove_all_keys(&self, group_id: i64) -> AppResult<u64> {
        let affected = repo::delete_all_keys(&self.pool, self.dialect, group_id).await?;
        self.store.remove_all(group_id);
        Ok(affected)
    }

    pub async fn remove_invalid_keys(&self, group_id: i64) -> AppResult<u64> {
        // Invalid keys are never in the in-memory store, so no eviction is needed there.
        repo::delete_invalid_keys(&self.pool, self.dialect, group_id).await
    }

    pub async fn restore_keys(&self, group_id: i64, ids: &[i64]) -> AppResult<u64> {
        let affected = repo::restore_keys(&self.pool, self.dialect, group_id, ids).await?;
        if affected > 0 {
            self.load_group_keys_to_store(group_id).await?;
        }
        Ok(affected)
    }

    /// Restores every invalid key in a group back to active.
    pub async fn restore_multiple_keys(&self, group_id: i64) -> AppResult<u64> {
        let affected = repo::restore_all_invalid_keys(&self.pool, self.dialect, group_id).await?;
        if affected > 0 {
            self.load_group_keys_to_store(group_id).await?;
        }
        Ok(affected)
    }

    pub async fn reset_group_active_keys_failure_count(&self, group_id: i64) -> AppResult<u64> {
        let affected = repo::reset_active_failure_count(&self.pool, self.dialect, group_id).await?;
        self.store.reset_failure_counts(group_id);
        Ok(affected)
    }

    /// Weighted-random selection over the group's active working set.
    /// Returns `ResourceNotFound` if the group has no selectable key.
    pub fn select_key(&self, group_id: i64, blacklist_threshold: u32) -> AppResult<ApiKey> {
        let keys = self.store.active_keys(group_id);
        if keys.is_empty() {
            return Err(AppError::not_found(format!("group {group_id} has no active keys")));
        }
        let weights: Vec<f64> = keys.iter().map(|k| k.selection_weight(blacklist_threshold)).collect();
        let idx = weighted_choice(&weights)
            .ok_or_else(|| AppError::not_found(format!("group {group_id} has no selectable key")))?;
        Ok(keys[idx].clone())
    }

    pub fn record_success(&self, group_id: i64, key_id: i64) {
        self.store.record_success(group_id, key_id);
        let _ = self.pending_tx.send(PendingUpdate {
            key_id,
            failure_count: 0,
            status: KeyStatus::Active,
        });
    }

    /// Increments the failure count; once it crosses `blacklist_threshold`
    /// the key is evicted from the selection pool and persisted as
    /// `invalid`.
    pub fn record_failure(&self, group_id: i64, key_id: i64, blacklist_threshold: u32) {
        let Some((count, blacklisted)) = self.store.record_failure(group_id, key_id, blacklist_threshold) else {
            return;
        };
        let status = if blacklisted { KeyStatus::Invalid } else { KeyStatus::Active };
        let _ = self.pending_tx.send(PendingUpdate {
            key_id,
            failure_count: count,
            status,
        });
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::KeyStatus;

    fn key(id: i64, failure_count: u32) -> ApiKey {
        ApiKey {
            id,
            group_id: 1,
            key_value: vec![],
            key_hash: format!("hash-{id}"),
            status: KeyStatus::Active,
            failure_count,
            last_used_at: None,
        }
    }

    #[test]
    fn selection_weight_favors_lower_failure_count() {
        let healthy = key(1, 0);
        let struggling = key(2, 5);
        assert!(healthy.selection_weight(10) > struggling.selection_weight(10));
    }
}
