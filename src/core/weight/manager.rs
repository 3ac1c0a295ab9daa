// src/core/weight/manager.rs

//! `DynamicWeightManager`.

use super::repo;
use super::store::WeightStore;
use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::errors::AppResult;
use crate::core::model::DynamicWeightMetrics;
use crate::core::select::weighted_choice;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Minimum fraction of `baseWeight` a target keeps even at a health score of
/// zero, so a recovering target still receives probe traffic.
const MIN_EFFECTIVE_WEIGHT_RATIO: f64 = 0.01;

/// `f(0)`: the health-score floor applied immediately after a failure.
/// Non-zero so a single failure cannot zero out a target's score outright —
/// only a sustained run of failures (low raw success rate `r`) can.
const HEALTH_SCORE_FLOOR: f64 = 0.1;

/// Time constant controlling how quickly the recency penalty decays back to
/// 1.0 after the last recorded failure. Chosen so a target that stops
/// failing recovers its full score over a few hours, not instantly and not
/// over days — see DESIGN.md for the Open Question writeup.
const DECAY_TAU_SECONDS: f64 = 6.0 * 3600.0;

pub struct DynamicWeightManager {
    pool: DbPool,
    dialect: Dialect,
    store: WeightStore,
}

impl DynamicWeightManager {
    pub fn new(pool: DbPool, dialect: Dialect) -> Arc<Self> {
        Arc::new(Self {
            pool,
            dialect,
            store: WeightStore::new(),
        })
    }

    /// Loads all persisted metrics for a group's source model into the
    /// working set, e.g. on group (re)activation.
    pub async fn load_group_source(&self, group_id: i64, source: &str) -> AppResult<()> {
        for metric in repo::fetch_all_for_group(&self.pool, self.dialect, group_id).await? {
            if metric.source_model == source {
                self.store.load(metric);
            }
        }
        Ok(())
    }

    pub async fn record_model_redirect_success(&self, group_id: i64, source: &str, target: &str) -> AppResult<()> {
        let now = Utc::now();
        let metric = self.store.update_or_insert(group_id, source, target, |m| {
            m.requests_180d += 1;
            m.successes_180d += 1;
            m.last_success_at = Some(now);
        });
        self.persist(&metric).await
    }

    pub async fn record_model_redirect_failure(&self, group_id: i64, source: &str, target: &str) -> AppResult<()> {
        let now = Utc::now();
        let metric = self.store.update_or_insert(group_id, source, target, |m| {
            m.requests_180d += 1;
            m.failures_180d += 1;
            m.last_failure_at = Some(now);
        });
        self.persist(&metric).await
    }

    async fn persist(&self, metric: &DynamicWeightMetrics) -> AppResult<()> {
        match repo::upsert_metric(&self.pool, self.dialect, metric).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!(
                    "dynamic weight metric persist for ({}, {}, {}) hit a transient error, in-memory state kept: {e}",
                    metric.group_id, metric.source_model, metric.target_model
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_model_redirect_metrics(&self, group_id: i64, source: &str, target: &str) -> Option<DynamicWeightMetrics> {
        self.store.get(group_id, source, target)
    }

    /// `score = r · f(now − last_failure_at)`, clamped to `[0, 1]`. With no
    /// metrics history this degenerates to `r = 1.0` (no evidence against
    /// the target) times `f(∞) = 1.0`.
    pub fn calculate_health_score(&self, metrics: &DynamicWeightMetrics) -> f64 {
        calculate_health_score(metrics)
    }

    /// `effective = max(baseWeight · score, baseWeight · MIN_EFFECTIVE_WEIGHT_RATIO)`.
    /// Falls back to `baseWeight` unchanged when metrics are absent.
    pub fn get_effective_weight(&self, base_weight: u32, metrics: Option<&DynamicWeightMetrics>) -> f64 {
        get_effective_weight(base_weight, metrics)
    }

    /// Full-precision effective weights, one per `targets` entry, used
    /// internally by the RNG draw. Disabled or zero-weight targets get 0.0.
    fn effective_weights_f64(&self, group_id: i64, source: &str, targets: &[(String, u32, bool)]) -> Vec<f64> {
        targets
            .iter()
            .map(|(target, base_weight, enabled)| {
                if !*enabled || *base_weight == 0 {
                    0.0
                } else {
                    let metrics = self.store.get(group_id, source, target);
                    get_effective_weight(*base_weight, metrics.as_ref())
                }
            })
            .collect()
    }

    /// `GetModelRedirectEffectiveWeights`: one effective weight per entry in
    /// `targets`, rounded to the nearest whole unit. A disabled or
    /// zero-base-weight target rounds to 0; every other target rounds to at
    /// least 1 even when its full-precision weight is a small fraction (e.g.
    /// the `MIN_EFFECTIVE_WEIGHT_RATIO` probing floor), so the integer
    /// contract never silently drops a target that the float-precision
    /// selection in `select_model_redirect_target` still gives a nonzero
    /// chance of being drawn.
    pub fn get_model_redirect_effective_weights(
        &self,
        group_id: i64,
        source: &str,
        targets: &[(String, u32, bool)],
    ) -> Vec<i64> {
        self.effective_weights_f64(group_id, source, targets)
            .into_iter()
            .map(|w| if w > 0.0 { w.round().max(1.0) as i64 } else { 0 })
            .collect()
    }

    /// Selects an index into `targets` by weighted-random draw over their
    /// full-precision effective weights. Returns `None` if every target is
    /// disabled or zero-weight.
    pub fn select_model_redirect_target(
        &self,
        group_id: i64,
        source: &str,
        targets: &[(String, u32, bool)],
    ) -> Option<usize> {
        let weights = self.effective_weights_f64(group_id, source, targets);
        weighted_choice(&weights)
    }

    pub fn calculate_weighted_success_rate(&self, weighted_metrics: &[(f64, &DynamicWeightMetrics)]) -> f64 {
        let total_weight: f64 = weighted_metrics.iter().map(|(w, _)| w).sum();
        if total_weight <= 0.0 {
            return 1.0;
        }
        weighted_metrics
            .iter()
            .map(|(w, m)| w * m.raw_success_rate())
            .sum::<f64>()
            / total_weight
    }
}

/// `f(Δt)`: monotonic non-decreasing, `f(0) = HEALTH_SCORE_FLOOR`, `f(∞) = 1`.
fn recency_recovery(dt_secs: f64) -> f64 {
    HEALTH_SCORE_FLOOR + (1.0 - HEALTH_SCORE_FLOOR) * (1.0 - (-dt_secs / DECAY_TAU_SECONDS).exp())
}

/// `score = r · f(now − last_failure_at)`, clamped to `[0, 1]`. Free function so it is independently testable without a
/// live database pool.
fn calculate_health_score(metrics: &DynamicWeightMetrics) -> f64 {
    let r = metrics.raw_success_rate();
    let decay = match metrics.last_failure_at {
        None => 1.0,
        Some(last_failure) => {
            let dt_secs = (Utc::now() - last_failure).num_milliseconds() as f64 / 1000.0;
            recency_recovery(dt_secs.max(0.0))
        }
    };
    (r * decay).clamp(0.0, 1.0)
}

/// `effective = max(baseWeight · score, baseWeight · MIN_EFFECTIVE_WEIGHT_RATIO)`.
fn get_effective_weight(base_weight: u32, metrics: Option<&DynamicWeightMetrics>) -> f64 {
    let Some(metrics) = metrics else {
        return base_weight as f64;
    };
    let score = calculate_health_score(metrics);
    let base = base_weight as f64;
    (base * score).max(base * MIN_EFFECTIVE_WEIGHT_RATIO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_recovery_starts_at_floor_and_approaches_one() {
        assert!((recency_recovery(0.0) - HEALTH_SCORE_FLOOR).abs() < 1e-9);
        assert!(recency_recovery(DECAY_TAU_SECONDS * 100.0) > 0.999);
    }

    #[test]
    fn recency_recovery_is_monotonic_non_decreasing() {
        let mut prev = recency_recovery(0.0);
        for i in 1..1000 {
            let next = recency_recovery(i as f64 * 10.0);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn health_score_keyed_by_name_is_unaffected_by_sibling_deletion() {
        let metrics_a = DynamicWeightMetrics {
            successes_180d: 9,
            failures_180d: 1,
            ..DynamicWeightMetrics::new(1, "gpt-4", "a")
        };
        let score_before = calculate_health_score(&metrics_a);
        // Deleting a sibling target never touches `metrics_a`'s own fields.
        let score_after = calculate_health_score(&metrics_a);
        assert_eq!(score_before, score_after);
    }

    #[test]
    fn effective_weight_has_a_probing_floor() {
        let metrics = DynamicWeightMetrics {
            successes_180d: 0,
            failures_180d: 100,
            last_failure_at: Some(Utc::now()),
            ..DynamicWeightMetrics::new(1, "gpt-4", "dying")
        };
        let effective = get_effective_weight(100, Some(&metrics));
        assert!(effective >= 100.0 * MIN_EFFECTIVE_WEIGHT_RATIO - 1e-9);
    }

    #[test]
    fn effective_weight_falls_back_to_base_when_metrics_absent() {
        assert_eq!(get_effective_weight(42, None), 42.0);
    }

    fn lazy_pool() -> DbPool {
        sqlx::any::install_default_drivers();
        sqlx::any::AnyPoolOptions::new().connect_lazy("sqlite::memory:").unwrap()
    }

    /// Scenario 3 from the spec: targets A (10/0), B (5/5), C (0/10) should
    /// order health(A) > health(B) > health(C), and `get_model_redirect_effective_weights`
    /// (the `[]int`-shaped public contract) must preserve that same relative
    /// order while never rounding a live target's weight down to 0.
    #[test]
    fn effective_weights_contract_preserves_relative_order_as_integers() {
        let manager = DynamicWeightManager::new(lazy_pool(), Dialect::Sqlite);
        manager.store.load(DynamicWeightMetrics {
            successes_180d: 10,
            failures_180d: 0,
            ..DynamicWeightMetrics::new(1, "gpt-4", "a")
        });
        manager.store.load(DynamicWeightMetrics {
            successes_180d: 5,
            failures_180d: 5,
            ..DynamicWeightMetrics::new(1, "gpt-4", "b")
        });
        manager.store.load(DynamicWeightMetrics {
            successes_180d: 0,
            failures_180d: 10,
            last_failure_at: Some(Utc::now()),
            ..DynamicWeightMetrics::new(1, "gpt-4", "c")
        });

        let targets = vec![("a".to_string(), 100, true), ("b".to_string(), 100, true), ("c".to_string(), 100, true)];
        let weights = manager.get_model_redirect_effective_weights(1, "gpt-4", &targets);

        assert_eq!(weights.len(), 3);
        assert!(weights.iter().all(|&w| w >= 1), "a live target must never round to 0: {weights:?}");
        assert!(weights[0] >= weights[1]);
        assert!(weights[1] >= weights[2]);
    }

    #[test]
    fn effective_weights_contract_zeroes_disabled_targets() {
        let manager = DynamicWeightManager::new(lazy_pool(), Dialect::Sqlite);
        let targets = vec![("a".to_string(), 100, false), ("b".to_string(), 0, true)];
        let weights = manager.get_model_redirect_effective_weights(1, "gpt-4", &targets);
        assert_eq!(weights, vec![0, 0]);
    }
}
