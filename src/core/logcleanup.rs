// src/core/logcleanup.rs

//! Background log-retention cleaner.

use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::db::schema::REQUEST_LOGS_TABLE;
use crate::core::errors::{AppError, AppResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

const BATCH_SIZE: i64 = 2000;
const PER_BATCH_TIMEOUT: Duration = Duration::from_secs(30);
const INTER_BATCH_SLEEP: Duration = Duration::from_millis(50);
/// How often the cleaner wakes up to check whether there is anything to delete.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Deletes one batch of at most `BATCH_SIZE` expired rows. Dialect-specific
/// because none of the three engines share an efficient bounded-delete
/// idiom: Postgres can order an inner `ctid` selection, MySQL supports
/// `DELETE ... ORDER BY ... LIMIT` directly, and SQLite (lacking both)
/// needs a select-then-delete two-step bounded by the cutoff.
async fn delete_one_batch(pool: &DbPool, dialect: Dialect, cutoff: DateTime<Utc>) -> AppResult<u64> {
    let sql = match dialect {
        Dialect::Postgres => format!(
            "DELETE FROM {REQUEST_LOGS_TABLE} WHERE ctid IN (\
             SELECT ctid FROM {REQUEST_LOGS_TABLE} WHERE timestamp < $1 LIMIT {BATCH_SIZE})"
        ),
        Dialect::MySql => {
            format!("DELETE FROM {REQUEST_LOGS_TABLE} WHERE timestamp < ? ORDER BY timestamp LIMIT {BATCH_SIZE}")
        }
        Dialect::Sqlite => format!(
            "DELETE FROM {REQUEST_LOGS_TABLE} WHERE rowid IN (\
             SELECT rowid FROM {REQUEST_LOGS_TABLE} WHERE timestamp < ? LIMIT {BATCH_SIZE})"
        ),
    };
    let result = tokio::time::timeout(PER_BATCH_TIMEOUT, sqlx::query(&sql).bind(cutoff).execute(pool))
        .await
        .map_err(|_| AppError::Transient("log cleanup batch delete timed out".into()))??;
    Ok(result.rows_affected())
}

/// Runs one full sweep: repeatedly deletes batches until a batch comes back
/// short of `BATCH_SIZE` rows, meaning nothing older than the cutoff remains.
pub async fn run_sweep(pool: &DbPool, dialect: Dialect, retention_days: u32) -> AppResult<u64> {
    let cutoff = Utc::now() - ChronoDuration::days(retention_days as i64);
    let mut total_deleted = 0u64;
    loop {
        let deleted = delete_one_batch(pool, dialect, cutoff).await?;
        total_deleted += deleted;
        if deleted < BATCH_SIZE as u64 {
            break;
        }
        tokio::time::sleep(INTER_BATCH_SLEEP).await;
    }
    Ok(total_deleted)
}

/// Spawns the hourly sweep loop, exiting cleanly when `shutdown_rx` fires.
pub fn spawn(pool: DbPool, dialect: Dialect, retention_days: u32, mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match run_sweep(&pool, dialect, retention_days).await {
                        Ok(deleted) if deleted > 0 => info!("log retention sweep deleted {deleted} rows"),
                        Ok(_) => {}
                        Err(e) => error!("log retention sweep failed: {e}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("log retention cleaner shutting down");
                    return;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_batch_sql_uses_ctid_subselect() {
        let sql = "DELETE FROM request_logs WHERE ctid IN (SELECT ctid FROM request_logs WHERE timestamp < $1 LIMIT 2000)";
        assert!(sql.contains("ctid"));
    }

    #[test]
    fn mysql_batch_sql_uses_order_by_limit() {
        let sql = format!(
            "DELETE FROM {REQUEST_LOGS_TABLE} WHERE timestamp < ? ORDER BY timestamp LIMIT {BATCH_SIZE}"
        );
        assert!(sql.contains("ORDER BY") && sql.contains("LIMIT 2000"));
    }
}
