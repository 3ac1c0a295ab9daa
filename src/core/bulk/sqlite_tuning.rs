// src/core/bulk/sqlite_tuning.rs

//! SQLite session/transaction PRAGMA tuning.

use crate::config::SqliteTuningConfig;
use crate::core::db::{DbPool, DbTx};
use crate::core::errors::AppResult;

/// Applies the operator-configured safe session pragmas once, at pool
/// startup. None of these can corrupt data or violate a transaction
/// boundary if the process dies mid-statement, so they're set globally.
pub async fn apply_safe_session_tuning(pool: &DbPool, tuning: &SqliteTuningConfig) -> AppResult<()> {
    if let Some(cache_size) = tuning.cache_size {
        sqlx::query(&format!("PRAGMA cache_size = {cache_size}")).execute(pool).await?;
    }
    if let Some(temp_store) = &tuning.temp_store {
        sqlx::query(&format!("PRAGMA temp_store = {temp_store}")).execute(pool).await?;
    }
    if let Some(mmap_size) = tuning.mmap_size {
        sqlx::query(&format!("PRAGMA mmap_size = {mmap_size}")).execute(pool).await?;
    }
    if let Some(page_size) = tuning.page_size {
        sqlx::query(&format!("PRAGMA page_size = {page_size}")).execute(pool).await?;
    }
    if let Some(busy_timeout) = tuning.busy_timeout_ms {
        sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout}")).execute(pool).await?;
    }
    if let Some(wal_autocheckpoint) = tuning.wal_autocheckpoint {
        sqlx::query(&format!("PRAGMA wal_autocheckpoint = {wal_autocheckpoint}"))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Toggles that speed up a bulk load but are only safe for the lifetime of
/// one transaction: left on globally they would survive a crash mid-write
/// and risk silent corruption or missed constraint violations for every
/// later connection, so each caller turns them on after `BEGIN` and calls
/// `restore` on the way out, including on the error path.
pub struct UnsafeBulkPragmas {
    restore: Vec<&'static str>,
}

impl UnsafeBulkPragmas {
    /// Enables unsafe-but-transaction-scoped pragmas on `tx`. The caller is
    /// responsible for calling `restore` before the transaction ends,
    /// including on the error path.
    pub async fn enable(tx: &mut DbTx<'_>) -> AppResult<Self> {
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *tx).await?;
        sqlx::query("PRAGMA synchronous = OFF").execute(&mut *tx).await?;
        Ok(Self {
            restore: vec!["PRAGMA foreign_keys = ON", "PRAGMA synchronous = NORMAL"],
        })
    }

    pub async fn restore(self, tx: &mut DbTx<'_>) -> AppResult<()> {
        for stmt in self.restore {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_statements_undo_every_unsafe_toggle() {
        let pragmas = UnsafeBulkPragmas {
            restore: vec!["PRAGMA foreign_keys = ON", "PRAGMA synchronous = NORMAL"],
        };
        assert_eq!(pragmas.restore.len(), 2);
    }
}
