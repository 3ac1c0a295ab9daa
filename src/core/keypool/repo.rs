// src/core/keypool/repo.rs

//! Raw persistence for `api_keys`, used by `KeyProvider` and the bulk
//! import/export pipeline.

use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::db::placeholder::{placeholder, placeholder_list};
use crate::core::db::schema::{API_KEYS_TABLE, API_KEY_COLUMNS};
use crate::core::errors::{AppError, AppResult};
use crate::core::model::{ApiKey, KeyStatus};
use sqlx::Row;

pub async fn fetch_active_keys(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<Vec<ApiKey>> {
    let sql = format!(
        "SELECT {} FROM {API_KEYS_TABLE} WHERE group_id = {} AND status = 'active'",
        API_KEY_COLUMNS.join(", "),
        placeholder(dialect, 1)
    );
    let rows = sqlx::query(&sql).bind(group_id).fetch_all(pool).await?;
    rows.iter().map(row_to_api_key).collect()
}

fn row_to_api_key(row: &sqlx::any::AnyRow) -> AppResult<ApiKey> {
    let status_raw: String = row.try_get("status").map_err(AppError::from)?;
    let status = match status_raw.as_str() {
        "active" => KeyStatus::Active,
        "invalid" => KeyStatus::Invalid,
        other => return Err(AppError::internal(format!("unknown key status '{other}'"))),
    };
    Ok(ApiKey {
        id: row.try_get("id").map_err(AppError::from)?,
        group_id: row.try_get("group_id").map_err(AppError::from)?,
        key_value: row.try_get("key_value").map_err(AppError::from)?,
        key_hash: row.try_get("key_hash").map_err(AppError::from)?,
        status,
        failure_count: row.try_get::<i64, _>("failure_count").unwrap_or_default().max(0) as u32,
        last_used_at: row.try_get("last_used_at").ok(),
    })
}

/// Fetches existing key hashes for a group, used by bulk import / streaming
/// import dedup.
pub async fn fetch_existing_hashes(
    pool: &DbPool,
    dialect: Dialect,
    group_id: i64,
) -> AppResult<std::collections::HashSet<String>> {
    let sql = format!(
        "SELECT key_hash FROM {API_KEYS_TABLE} WHERE group_id = {}",
        placeholder(dialect, 1)
    );
    let rows = sqlx::query(&sql).bind(group_id).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .filter_map(|r| r.try_get::<String, _>("key_hash").ok())
        .collect())
}

/// Finds a key's id by its (group_id, key_hash), used when a caller knows a
/// key's plaintext (and can therefore hash it) but not its id — e.g.
/// rotating a child group's outbound credential after the parent's proxy
/// key changes.
pub async fn fetch_id_by_hash(pool: &DbPool, dialect: Dialect, group_id: i64, key_hash: &str) -> AppResult<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {API_KEYS_TABLE} WHERE group_id = {} AND key_hash = {}",
        placeholder(dialect, 1),
        placeholder(dialect, 2)
    );
    let row = sqlx::query(&sql).bind(group_id).bind(key_hash).fetch_optional(pool).await?;
    Ok(row.map(|r| r.try_get::<i64, _>("id")).transpose()?)
}

pub async fn delete_keys(pool: &DbPool, dialect: Dialect, group_id: i64, ids: &[i64]) -> AppResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let group_ph = placeholder(dialect, 1);
    let in_list = placeholder_list(dialect, 2, ids.len());
    let sql = format!("DELETE FROM {API_KEYS_TABLE} WHERE group_id = {group_ph} AND id IN ({in_list})");
    let mut q = sqlx::query(&sql).bind(group_id);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

pub async fn delete_all_keys(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<u64> {
    let sql = format!("DELETE FROM {API_KEYS_TABLE} WHERE group_id = {}", placeholder(dialect, 1));
    Ok(sqlx::query(&sql).bind(group_id).execute(pool).await?.rows_affected())
}

pub async fn delete_invalid_keys(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<u64> {
    let sql = format!(
        "DELETE FROM {API_KEYS_TABLE} WHERE group_id = {} AND status = 'invalid'",
        placeholder(dialect, 1)
    );
    Ok(sqlx::query(&sql).bind(group_id).execute(pool).await?.rows_affected())
}

pub async fn restore_keys(pool: &DbPool, dialect: Dialect, group_id: i64, ids: &[i64]) -> AppResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let group_ph = placeholder(dialect, 1);
    let in_list = placeholder_list(dialect, 2, ids.len());
    let sql = format!(
        "UPDATE {API_KEYS_TABLE} SET status = 'active', failure_count = 0 WHERE group_id = {group_ph} AND id IN ({in_list})"
    );
    let mut q = sqlx::query(&sql).bind(group_id);
    for id in ids {
        q = q.bind(*id);
    }
    Ok(q.execute(pool).await?.rows_affected())
}

pub async fn restore_all_invalid_keys(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<u64> {
    let sql = format!(
        "UPDATE {API_KEYS_TABLE} SET status = 'active', failure_count = 0 WHERE group_id = {} AND status = 'invalid'",
        placeholder(dialect, 1)
    );
    Ok(sqlx::query(&sql).bind(group_id).execute(pool).await?.rows_affected())
}

pub async fn reset_active_failure_count(pool: &DbPool, dialect: Dialect, group_id: i64) -> AppResult<u64> {
    let sql = format!(
        "UPDATE {API_KEYS_TABLE} SET failure_count = 0 WHERE group_id = {} AND status = 'active'",
        placeholder(dialect, 1)
    );
    Ok(sqlx::query(&sql).bind(group_id).execute(pool).await?.rows_affected())
}

/// Fetches one offset-paginated page of a group's keys, in a fixed order so
/// paging is stable across calls without relying on driver cursor APIs.
pub async fn fetch_keys_page(
    pool: &DbPool,
    dialect: Dialect,
    group_id: i64,
    offset: i64,
    limit: i64,
) -> AppResult<Vec<ApiKey>> {
    let sql = format!(
        "SELECT {} FROM {API_KEYS_TABLE} WHERE group_id = {} ORDER BY id LIMIT {} OFFSET {}",
        API_KEY_COLUMNS.join(", "),
        placeholder(dialect, 1),
        limit,
        offset
    );
    let rows = sqlx::query(&sql).bind(group_id).fetch_all(pool).await?;
    rows.iter().map(row_to_api_key).collect()
}

/// Per-group key counts (total/active/invalid), one grouped aggregation for
/// the whole `group_ids` set rather than one query per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyCounts {
    pub total: u64,
    pub active: u64,
    pub invalid: u64,
}

pub async fn fetch_key_counts_by_group(
    pool: &DbPool,
    dialect: Dialect,
    group_ids: &[i64],
) -> AppResult<std::collections::HashMap<i64, KeyCounts>> {
    let mut out = std::collections::HashMap::new();
    if group_ids.is_empty() {
        return Ok(out);
    }
    let in_list = placeholder_list(dialect, 1, group_ids.len());
    let sql = format!(
        "SELECT group_id, status, COUNT(*) as cnt FROM {API_KEYS_TABLE} WHERE group_id IN ({in_list}) GROUP BY group_id, status"
    );
    let mut q = sqlx::query(&sql);
    for id in group_ids {
        q = q.bind(*id);
    }
    let rows = q.fetch_all(pool).await?;
    for row in rows {
        let group_id: i64 = row.try_get("group_id").map_err(AppError::from)?;
        let status: String = row.try_get("status").map_err(AppError::from)?;
        let count: i64 = row.try_get("cnt").map_err(AppError::from)?;
        let entry = out.entry(group_id).or_insert_with(KeyCounts::default);
        entry.total += count.max(0) as u64;
        match status.as_str() {
            "active" => entry.active += count.max(0) as u64,
            "invalid" => entry.invalid += count.max(0) as u64,
            _ => {}
        }
    }
    Ok(out)
}

/// Batched flush of failure-count/status updates produced by the in-memory
/// store.
pub async fn flush_key_states(
    pool: &DbPool,
    dialect: Dialect,
    updates: &[(i64, u32, KeyStatus)],
) -> AppResult<()> {
    let sql = format!(
        "UPDATE {API_KEYS_TABLE} SET failure_count = {}, status = {} WHERE id = {}",
        placeholder(dialect, 1),
        placeholder(dialect, 2),
        placeholder(dialect, 3)
    );
    let mut tx = pool.begin().await?;
    for (id, failure_count, status) in updates {
        let status_str = match status {
            KeyStatus::Active => "active",
            KeyStatus::Invalid => "invalid",
        };
        sqlx::query(&sql)
            .bind(*failure_count as i64)
            .bind(status_str)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}
