// src/core/model/key.rs

//! The `ApiKey` credential type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Invalid,
}

/// One credential in one group. `key_value` is ciphertext at rest;
/// `key_hash` is a deterministic digest used for in-group dedup and lookup
/// without needing to decrypt. `(group_id, key_hash)` uniqueness is
/// enforced at the application layer, not by a database constraint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub group_id: i64,
    pub key_value: Vec<u8>,
    pub key_hash: String,
    pub status: KeyStatus,
    pub failure_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Weight used by weighted-random key selection: linearly decreasing in
    /// `failure_count` up to `threshold`, floored at zero.
    pub fn selection_weight(&self, blacklist_threshold: u32) -> f64 {
        if blacklist_threshold == 0 {
            return 1.0;
        }
        let ratio = (self.failure_count as f64 / blacklist_threshold as f64).min(1.0);
        (1.0 - ratio).max(0.0)
    }
}
