// src/core/db/pool.rs

//! Connection pool construction. Uses `sqlx::AnyPool` so every subsystem
//! shares one pool and one transaction type across the three dialects;
//! dialect-specific SQL text is chosen explicitly wherever it matters
//! (see `db::placeholder`, `core::bulk::dialect`, `core::logcleanup`).

use crate::config::{Config, Dialect};
use crate::core::errors::AppResult;
use sqlx::any::{Any, AnyPoolOptions};
use sqlx::{Pool, Transaction};

pub type DbPool = Pool<Any>;
pub type DbTx<'a> = Transaction<'a, Any>;

/// Connects to `config.database_url`, installing the Any-driver backends on
/// first use. Safe to call more than once per process (idempotent install).
pub async fn connect(config: &Config) -> AppResult<DbPool> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(match config.dialect {
            Dialect::Sqlite => 1, // sqlite allows exactly one writer at a time
            _ => 10,
        })
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}
