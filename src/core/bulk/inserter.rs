// src/core/bulk/inserter.rs

//! `BulkInsertAPIKeys` / `BulkInsertAPIKeysWithTx` / `BulkInsertGeneric`.
//! SQLite batches run inside a `SAVEPOINT`, releasing and resaving every
//! `SAVEPOINT_YIELD_INTERVAL` batches with a brief sleep to let another
//! connection acquire the single writer lock; mysql/postgres batches are
//! plain prepared multi-row inserts.

use super::dialect::calculate_optimal_batch_size;
use super::sqlite_tuning::UnsafeBulkPragmas;
use super::values::BindValue;
use crate::config::Dialect;
use crate::core::db::placeholder::values_clause;
use crate::core::db::schema::API_KEYS_TABLE;
use crate::core::db::{DbPool, DbTx};
use crate::core::errors::{AppError, AppResult};
use std::time::Duration;
use tracing::info;

/// Every this-many batches, an sqlite bulk insert releases and re-acquires
/// its savepoint so other connections get a chance at the writer lock.
const SAVEPOINT_YIELD_INTERVAL: u32 = 20;
const SAVEPOINT_YIELD_SLEEP: Duration = Duration::from_millis(5);

/// A not-yet-persisted API key, ciphertext and hash already computed by the
/// caller (the crypto collaborator is out of this module's scope).
pub struct NewApiKey {
    pub group_id: i64,
    pub key_value: Vec<u8>,
    pub key_hash: String,
}

pub async fn bulk_insert_api_keys(pool: &DbPool, dialect: Dialect, keys: &[NewApiKey]) -> AppResult<u64> {
    let mut tx = pool.begin().await?;
    let inserted = bulk_insert_api_keys_with_tx(&mut tx, dialect, keys, None).await?;
    tx.commit().await?;
    Ok(inserted)
}

pub async fn bulk_insert_api_keys_with_tx(
    tx: &mut DbTx<'_>,
    dialect: Dialect,
    keys: &[NewApiKey],
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> AppResult<u64> {
    if keys.is_empty() {
        return Ok(0);
    }
    let rows: Vec<Vec<BindValue>> = keys
        .iter()
        .map(|k| {
            vec![
                BindValue::I64(k.group_id),
                BindValue::Blob(k.key_value.clone()),
                BindValue::Text(k.key_hash.clone()),
            ]
        })
        .collect();
    bulk_insert_generic(
        tx,
        dialect,
        API_KEYS_TABLE,
        &["group_id", "key_value", "key_hash"],
        &rows,
        progress.as_deref_mut(),
    )
    .await
}

/// Inserts `rows` into `table` (each row binding values for `columns`, in
/// order) in dialect-appropriate batches, reporting progress every batch
/// and at 25/50/75% for imports large enough to warrant it.
pub async fn bulk_insert_generic(
    tx: &mut DbTx<'_>,
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    rows: &[Vec<BindValue>],
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> AppResult<u64> {
    let total = rows.len();
    if total == 0 {
        return Ok(0);
    }
    let avg_field_size = {
        let sum: usize = rows.iter().flat_map(|r| r.iter().map(BindValue::approx_size)).sum();
        (sum / (total * columns.len()).max(1)).max(1)
    };
    let batch_size = calculate_optimal_batch_size(dialect, avg_field_size, columns.len(), total).max(1) as usize;

    let is_sqlite = dialect == Dialect::Sqlite;
    let mut unsafe_pragmas = if is_sqlite {
        Some(UnsafeBulkPragmas::enable(&mut *tx).await?)
    } else {
        None
    };
    if is_sqlite {
        sqlx::query("SAVEPOINT bulk_insert").execute(&mut *tx).await?;
    }

    let tier = super::tiers::OperationTier::for_count(total);
    let checkpoints = tier.progress_checkpoints();
    let mut next_checkpoint_idx = 0usize;

    let mut inserted = 0u64;
    let mut batches_since_yield = 0u32;
    let column_list = columns.join(", ");

    for chunk in rows.chunks(batch_size) {
        let sql = format!(
            "INSERT INTO {table} ({column_list}) VALUES {}",
            values_clause(dialect, chunk.len(), columns.len())
        );
        let mut query = sqlx::query(&sql);
        for row in chunk {
            for value in row {
                query = value.bind(query);
            }
        }
        match query.execute(&mut *tx).await {
            Ok(result) => inserted += result.rows_affected(),
            Err(e) => {
                if is_sqlite {
                    let _ = sqlx::query("ROLLBACK TO SAVEPOINT bulk_insert").execute(&mut *tx).await;
                    if let Some(pragmas) = unsafe_pragmas.take() {
                        pragmas.restore(&mut *tx).await?;
                    }
                }
                return Err(AppError::from(e));
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            cb(inserted as usize, total);
        }
        while next_checkpoint_idx < checkpoints.len()
            && inserted as usize * 100 / total >= checkpoints[next_checkpoint_idx] as usize
        {
            info!(
                "bulk insert into {table} at {}% ({inserted}/{total})",
                checkpoints[next_checkpoint_idx]
            );
            next_checkpoint_idx += 1;
        }

        if is_sqlite {
            batches_since_yield += 1;
            if batches_since_yield >= SAVEPOINT_YIELD_INTERVAL {
                sqlx::query("RELEASE SAVEPOINT bulk_insert").execute(&mut *tx).await?;
                tokio::time::sleep(SAVEPOINT_YIELD_SLEEP).await;
                sqlx::query("SAVEPOINT bulk_insert").execute(&mut *tx).await?;
                batches_since_yield = 0;
            }
        }
    }

    if is_sqlite {
        sqlx::query("RELEASE SAVEPOINT bulk_insert").execute(&mut *tx).await?;
        if let Some(pragmas) = unsafe_pragmas.take() {
            pragmas.restore(&mut *tx).await?;
        }
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_api_key_carries_ciphertext_not_plaintext() {
        let key = NewApiKey {
            group_id: 1,
            key_value: vec![1, 2, 3],
            key_hash: "abc".into(),
        };
        assert_eq!(key.key_value, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn sqlite_insert_runs_with_unsafe_pragmas_enabled_and_restored() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE api_keys (id INTEGER PRIMARY KEY, group_id INTEGER, key_value BLOB, \
             key_hash TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let keys = vec![
            NewApiKey { group_id: 1, key_value: vec![1], key_hash: "a".into() },
            NewApiKey { group_id: 1, key_value: vec![2], key_hash: "b".into() },
        ];
        // Exercises UnsafeBulkPragmas::enable/restore around the real
        // SAVEPOINT-scoped insert path: this must complete and commit (and
        // the pool must still be usable afterward) rather than leave the
        // connection stuck mid-toggle.
        let inserted = bulk_insert_api_keys(&pool, Dialect::Sqlite, &keys).await.unwrap();
        assert_eq!(inserted, 2);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys").fetch_one(&pool).await.unwrap();
        assert_eq!(count.0, 2);
    }

    #[tokio::test]
    async fn sqlite_insert_restores_unsafe_pragmas_on_batch_failure() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // No table created: the insert must fail, but `enable`/`restore`
        // around it must not leave the connection in a broken state for the
        // next caller on the same pool.
        let keys = vec![NewApiKey { group_id: 1, key_value: vec![1], key_hash: "a".into() }];
        let err = bulk_insert_api_keys(&pool, Dialect::Sqlite, &keys).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let row: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(row.0, 1);
    }
}
