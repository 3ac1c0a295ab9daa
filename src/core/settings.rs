// src/core/settings.rs

//! Persistence for the single-row `system_settings` table.

use crate::config::Dialect;
use crate::core::db::DbPool;
use crate::core::db::placeholder::placeholder;
use crate::core::db::schema::SYSTEM_SETTINGS_TABLE;
use crate::core::errors::{AppError, AppResult};
use crate::core::model::SystemSettings;
use sqlx::Row;

/// The table holds exactly one row, identified by this fixed id.
const SETTINGS_ROW_ID: i64 = 1;

/// Loads the system settings row, falling back to defaults if it has never
/// been written (e.g. a freshly migrated database).
pub async fn load(pool: &DbPool, dialect: Dialect) -> AppResult<SystemSettings> {
    let sql = format!(
        "SELECT request_log_retention_days, default_blacklist_threshold FROM {SYSTEM_SETTINGS_TABLE} WHERE id = {}",
        placeholder(dialect, 1)
    );
    let row = sqlx::query(&sql).bind(SETTINGS_ROW_ID).fetch_optional(pool).await?;
    let Some(row) = row else {
        return Ok(SystemSettings::default());
    };
    Ok(SystemSettings {
        request_log_retention_days: row.try_get::<i64, _>("request_log_retention_days").map_err(AppError::from)?.max(0) as u32,
        default_blacklist_threshold: row.try_get::<i64, _>("default_blacklist_threshold").map_err(AppError::from)?.max(0) as u32,
    })
}

/// Upserts the single settings row.
pub async fn save(pool: &DbPool, dialect: Dialect, settings: &SystemSettings) -> AppResult<()> {
    let sql = match dialect {
        Dialect::Sqlite | Dialect::Postgres => format!(
            "INSERT INTO {SYSTEM_SETTINGS_TABLE} (id, request_log_retention_days, default_blacklist_threshold) \
             VALUES ({p1}, {p2}, {p3}) \
             ON CONFLICT (id) DO UPDATE SET request_log_retention_days = excluded.request_log_retention_days, \
             default_blacklist_threshold = excluded.default_blacklist_threshold",
            p1 = placeholder(dialect, 1),
            p2 = placeholder(dialect, 2),
            p3 = placeholder(dialect, 3),
        ),
        Dialect::MySql => format!(
            "INSERT INTO {SYSTEM_SETTINGS_TABLE} (id, request_log_retention_days, default_blacklist_threshold) \
             VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE request_log_retention_days = VALUES(request_log_retention_days), \
             default_blacklist_threshold = VALUES(default_blacklist_threshold)"
        ),
    };
    sqlx::query(&sql)
        .bind(SETTINGS_ROW_ID)
        .bind(settings.request_log_retention_days as i64)
        .bind(settings.default_blacklist_threshold as i64)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_row_falls_back_to_defaults() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE system_settings (id INTEGER PRIMARY KEY, request_log_retention_days INTEGER, default_blacklist_threshold INTEGER)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let settings = load(&pool, Dialect::Sqlite).await.unwrap();
        assert_eq!(settings, SystemSettings::default());
    }

    #[tokio::test]
    async fn saved_settings_round_trip() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE system_settings (id INTEGER PRIMARY KEY, request_log_retention_days INTEGER, default_blacklist_threshold INTEGER)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let settings = SystemSettings { request_log_retention_days: 7, default_blacklist_threshold: 5 };
        save(&pool, Dialect::Sqlite, &settings).await.unwrap();
        let loaded = load(&pool, Dialect::Sqlite).await.unwrap();
        assert_eq!(loaded, settings);
    }
}
