// src/core/model/weight.rs

//! Per (group, source_model, target_model) health metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DynamicWeightMetrics {
    pub group_id: i64,
    pub source_model: String,
    pub target_model: String,
    pub requests_180d: u64,
    pub successes_180d: u64,
    pub failures_180d: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl DynamicWeightMetrics {
    pub fn new(group_id: i64, source_model: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self {
            group_id,
            source_model: source_model.into(),
            target_model: target_model.into(),
            requests_180d: 0,
            successes_180d: 0,
            failures_180d: 0,
            last_success_at: None,
            last_failure_at: None,
        }
    }

    /// Raw success rate over the decayed window, with no data defaulting to
    /// a neutral 1.0 (no observations means no evidence against the target).
    pub fn raw_success_rate(&self) -> f64 {
        let total = self.successes_180d + self.failures_180d;
        if total == 0 {
            1.0
        } else {
            self.successes_180d as f64 / total as f64
        }
    }
}
