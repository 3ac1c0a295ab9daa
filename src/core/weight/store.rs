// src/core/weight/store.rs

//! In-memory metrics keyed by (group_id, source_model, target_model).
//! Deleting one target must not renumber or shift neighbors — keying by name rather than array index makes that property
//! hold by construction.

use crate::core::model::DynamicWeightMetrics;
use dashmap::DashMap;
use parking_lot::RwLock;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct MetricKey {
    group_id: i64,
    source_model: String,
    target_model: String,
}

#[derive(Default)]
pub struct WeightStore {
    metrics: DashMap<MetricKey, RwLock<DynamicWeightMetrics>>,
}

impl WeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, metric: DynamicWeightMetrics) {
        let key = MetricKey {
            group_id: metric.group_id,
            source_model: metric.source_model.clone(),
            target_model: metric.target_model.clone(),
        };
        self.metrics.insert(key, RwLock::new(metric));
    }

    pub fn get(&self, group_id: i64, source: &str, target: &str) -> Option<DynamicWeightMetrics> {
        let key = MetricKey {
            group_id,
            source_model: source.to_string(),
            target_model: target.to_string(),
        };
        self.metrics.get(&key).map(|e| e.read().clone())
    }

    pub fn all_for_source(&self, group_id: i64, source: &str) -> Vec<DynamicWeightMetrics> {
        self.metrics
            .iter()
            .filter(|e| e.key().group_id == group_id && e.key().source_model == source)
            .map(|e| e.value().read().clone())
            .collect()
    }

    /// Applies `f` to the metric for `(group_id, source, target)`, creating
    /// it if absent, and returns the updated value.
    pub fn update_or_insert(
        &self,
        group_id: i64,
        source: &str,
        target: &str,
        f: impl FnOnce(&mut DynamicWeightMetrics),
    ) -> DynamicWeightMetrics {
        let key = MetricKey {
            group_id,
            source_model: source.to_string(),
            target_model: target.to_string(),
        };
        let entry = self
            .metrics
            .entry(key)
            .or_insert_with(|| RwLock::new(DynamicWeightMetrics::new(group_id, source, target)));
        let mut guard = entry.write();
        f(&mut guard);
        guard.clone()
    }
}
