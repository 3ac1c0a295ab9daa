// src/core/metrics.rs

//! Prometheus gauges for the pool/task observability surface: scoping out a
//! client wire protocol and HTTP routing doesn't mean scoping out metrics
//! entirely. Registered once via `once_cell::sync::Lazy`, the same pattern
//! used elsewhere in this codebase.

use once_cell::sync::Lazy;
use prometheus::{
    Gauge, GaugeVec, IntCounterVec, TextEncoder, register_gauge, register_gauge_vec,
    register_int_counter_vec,
};

/// Active (selectable) key count, labeled by group name.
pub static KEYS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "keygate_keys_active",
        "Number of active API keys currently held per group.",
        &["group"]
    )
    .unwrap()
});

/// Invalid (blacklisted) key count, labeled by group name.
pub static KEYS_INVALID: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "keygate_keys_invalid",
        "Number of invalid API keys per group.",
        &["group"]
    )
    .unwrap()
});

/// 1 while a long-running task (import/delete/restore) is in progress.
pub static TASK_RUNNING: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("keygate_task_running", "1 if a long-running task is in progress, else 0.").unwrap());

/// Progress ratio (`processed / total`) of the currently running task, if any.
pub static TASK_PROGRESS_RATIO: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("keygate_task_progress_ratio", "Fraction complete of the running task.").unwrap());

/// Key-selection outcomes, labeled by group and outcome (`success`/`failure`).
pub static KEY_SELECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "keygate_key_selections_total",
        "Total key selection outcomes, labeled by group and outcome.",
        &["group", "outcome"]
    )
    .unwrap()
});

/// Number of groups currently held in the cache.
pub static GROUPS_CACHED: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("keygate_groups_cached", "Number of groups currently in the group cache.").unwrap());

/// Gathers all registered metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_metrics_includes_registered_series() {
        KEYS_ACTIVE.with_label_values(&["g1"]).set(3.0);
        let text = gather_metrics();
        assert!(text.contains("keygate_keys_active"));
    }
}
