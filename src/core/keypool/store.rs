// src/core/keypool/store.rs

//! The in-memory active-key store backing `KeyProvider`. Holds only active
//! keys per group — invalid keys are not selection candidates and are left
//! to the database.

use crate::core::model::ApiKey;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

#[derive(Default)]
pub struct KeyStore {
    groups: DashMap<i64, RwLock<Vec<ApiKey>>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a group's active-key set wholesale, e.g. on initial load or
    /// after a bulk restore.
    pub fn load(&self, group_id: i64, keys: Vec<ApiKey>) {
        self.groups.insert(group_id, RwLock::new(keys));
    }

    pub fn clear_group(&self, group_id: i64) {
        self.groups.remove(&group_id);
    }

    /// Returns a clone of every active key currently held for a group, used
    /// for weighted selection.
    pub fn active_keys(&self, group_id: i64) -> Vec<ApiKey> {
        self.groups
            .get(&group_id)
            .map(|entry| entry.read().clone())
            .unwrap_or_default()
    }

    pub fn insert(&self, group_id: i64, key: ApiKey) {
        self.groups.entry(group_id).or_default().write().push(key);
    }

    pub fn remove(&self, group_id: i64, ids: &[i64]) {
        if let Some(entry) = self.groups.get(&group_id) {
            entry.write().retain(|k| !ids.contains(&k.id));
        }
    }

    pub fn remove_all(&self, group_id: i64) {
        if let Some(entry) = self.groups.get(&group_id) {
            entry.write().clear();
        }
    }

    /// Records a successful use: resets failure count, stamps `last_used_at`.
    pub fn record_success(&self, group_id: i64, key_id: i64) {
        if let Some(entry) = self.groups.get(&group_id) {
            let mut keys = entry.write();
            if let Some(k) = keys.iter_mut().find(|k| k.id == key_id) {
                k.failure_count = 0;
                k.last_used_at = Some(Utc::now());
            }
        }
    }

    /// Records a failure, incrementing `failure_count`. Returns the new
    /// count and whether it crossed `blacklist_threshold`, in which case the
    /// caller must remove the key from the active store (it becomes
    /// `invalid` in the database) —.
    pub fn record_failure(&self, group_id: i64, key_id: i64, blacklist_threshold: u32) -> Option<(u32, bool)> {
        let Some(entry) = self.groups.get(&group_id) else {
            return None;
        };
        let mut keys = entry.write();
        let idx = keys.iter().position(|k| k.id == key_id)?;
        keys[idx].failure_count += 1;
        let count = keys[idx].failure_count;
        let blacklisted = blacklist_threshold > 0 && count >= blacklist_threshold;
        if blacklisted {
            keys.remove(idx);
        }
        Some((count, blacklisted))
    }

    pub fn reset_failure_counts(&self, group_id: i64) {
        if let Some(entry) = self.groups.get(&group_id) {
            for k in entry.write().iter_mut() {
                k.failure_count = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::KeyStatus;

    fn key(id: i64) -> ApiKey {
        ApiKey {
            id,
            group_id: 1,
            key_value: vec![],
            key_hash: format!("hash-{id}"),
            status: KeyStatus::Active,
            failure_count: 0,
            last_used_at: None,
        }
    }

    #[test]
    fn record_failure_evicts_at_threshold() {
        let store = KeyStore::new();
        store.load(1, vec![key(1)]);
        assert_eq!(store.record_failure(1, 1, 3), Some((1, false)));
        assert_eq!(store.record_failure(1, 1, 3), Some((2, false)));
        assert_eq!(store.record_failure(1, 1, 3), Some((3, true)));
        assert!(store.active_keys(1).is_empty());
    }

    #[test]
    fn zero_threshold_never_blacklists() {
        let store = KeyStore::new();
        store.load(1, vec![key(1)]);
        for _ in 0..10 {
            store.record_failure(1, 1, 0);
        }
        assert_eq!(store.active_keys(1).len(), 1);
    }

    #[test]
    fn record_success_resets_failure_count() {
        let store = KeyStore::new();
        let mut k = key(1);
        k.failure_count = 2;
        store.load(1, vec![k]);
        store.record_success(1, 1);
        assert_eq!(store.active_keys(1)[0].failure_count, 0);
    }
}
