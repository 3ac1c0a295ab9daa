// src/core/weight/repo.rs

//! Persistence for `dynamic_weight_metrics`.

use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::db::placeholder::placeholder;
use crate::core::db::schema::{DYNAMIC_WEIGHT_METRICS_TABLE, WEIGHT_METRICS_COLUMNS};
use crate::core::errors::{AppError, AppResult};
use crate::core::model::DynamicWeightMetrics;
use sqlx::Row;

pub async fn fetch_metric(
    pool: &DbPool,
    dialect: Dialect,
    group_id: i64,
    source: &str,
    target: &str,
) -> AppResult<Option<DynamicWeightMetrics>> {
    let sql = format!(
        "SELECT {} FROM {DYNAMIC_WEIGHT_METRICS_TABLE} WHERE group_id = {} AND source_model = {} AND target_model = {}",
        WEIGHT_METRICS_COLUMNS.join(", "),
        placeholder(dialect, 1),
        placeholder(dialect, 2),
        placeholder(dialect, 3),
    );
    let row = sqlx::query(&sql)
        .bind(group_id)
        .bind(source)
        .bind(target)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_metric).transpose()
}

pub async fn fetch_all_for_group(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<Vec<DynamicWeightMetrics>> {
    let sql = format!(
        "SELECT {} FROM {DYNAMIC_WEIGHT_METRICS_TABLE} WHERE group_id = {}",
        WEIGHT_METRICS_COLUMNS.join(", "),
        placeholder(dialect, 1),
    );
    let rows = sqlx::query(&sql).bind(group_id).fetch_all(pool).await?;
    rows.iter().map(row_to_metric).collect()
}

fn row_to_metric(row: &sqlx::any::AnyRow) -> AppResult<DynamicWeightMetrics> {
    Ok(DynamicWeightMetrics {
        group_id: row.try_get("group_id").map_err(AppError::from)?,
        source_model: row.try_get("source_model").map_err(AppError::from)?,
        target_model: row.try_get("target_model").map_err(AppError::from)?,
        requests_180d: row.try_get::<i64, _>("requests_180d").unwrap_or_default().max(0) as u64,
        successes_180d: row.try_get::<i64, _>("successes_180d").unwrap_or_default().max(0) as u64,
        failures_180d: row.try_get::<i64, _>("failures_180d").unwrap_or_default().max(0) as u64,
        last_success_at: row.try_get("last_success_at").ok(),
        last_failure_at: row.try_get("last_failure_at").ok(),
    })
}

/// Upserts one metric row. Dialect-specific upsert syntax: SQLite/Postgres use
/// `ON CONFLICT`, MySQL uses `ON DUPLICATE KEY UPDATE`.
pub async fn upsert_metric(pool: &DbPool, dialect: Dialect, metric: &DynamicWeightMetrics) -> AppResult<()> {
    let sql = match dialect {
        Dialect::Sqlite | Dialect::Postgres => format!(
            "INSERT INTO {DYNAMIC_WEIGHT_METRICS_TABLE} \
             (group_id, source_model, target_model, requests_180d, successes_180d, failures_180d, last_success_at, last_failure_at) \
             VALUES ({p1}, {p2}, {p3}, {p4}, {p5}, {p6}, {p7}, {p8}) \
             ON CONFLICT (group_id, source_model, target_model) DO UPDATE SET \
             requests_180d = excluded.requests_180d, successes_180d = excluded.successes_180d, \
             failures_180d = excluded.failures_180d, last_success_at = excluded.last_success_at, \
             last_failure_at = excluded.last_failure_at",
            p1 = placeholder(dialect, 1),
            p2 = placeholder(dialect, 2),
            p3 = placeholder(dialect, 3),
            p4 = placeholder(dialect, 4),
            p5 = placeholder(dialect, 5),
            p6 = placeholder(dialect, 6),
            p7 = placeholder(dialect, 7),
            p8 = placeholder(dialect, 8),
        ),
        Dialect::MySql => format!(
            "INSERT INTO {DYNAMIC_WEIGHT_METRICS_TABLE} \
             (group_id, source_model, target_model, requests_180d, successes_180d, failures_180d, last_success_at, last_failure_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE requests_180d = VALUES(requests_180d), successes_180d = VALUES(successes_180d), \
             failures_180d = VALUES(failures_180d), last_success_at = VALUES(last_success_at), \
             last_failure_at = VALUES(last_failure_at)"
        ),
    };
    sqlx::query(&sql)
        .bind(metric.group_id)
        .bind(&metric.source_model)
        .bind(&metric.target_model)
        .bind(metric.requests_180d as i64)
        .bind(metric.successes_180d as i64)
        .bind(metric.failures_180d as i64)
        .bind(metric.last_success_at)
        .bind(metric.last_failure_at)
        .execute(pool)
        .await?;
    Ok(())
}
