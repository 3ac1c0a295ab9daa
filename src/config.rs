// src/config.rs

//! Manages service configuration: loading from the environment, resolving
//! dialect-specific defaults, and validation.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum allowed value for `DB_LOOKUP_TIMEOUT_MS` — below this the loader
/// would spend more time retrying than querying.
const MIN_DB_LOOKUP_TIMEOUT_MS: u64 = 50;
const DEFAULT_DB_LOOKUP_TIMEOUT_MS: u64 = 1200;
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_METRICS_PORT: u16 = 9090;

/// The relational dialect a `DATABASE_URL` resolves to. Each dialect carries
/// its own batch-size cap and session-tuning rules (see `core::bulk::dialect`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    pub fn from_database_url(url: &str) -> Result<Self> {
        if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else if url.starts_with("mysql:") {
            Ok(Dialect::MySql)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Dialect::Postgres)
        } else {
            Err(anyhow!(
                "unrecognized DATABASE_URL scheme in '{url}': expected sqlite:, mysql:, or postgres:"
            ))
        }
    }
}

/// SQLite session-tuning knobs, sourced from environment variables. All
/// fields are optional; absent values leave the driver default untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqliteTuningConfig {
    pub cache_size: Option<i64>,
    pub temp_store: Option<String>,
    pub mmap_size: Option<i64>,
    pub page_size: Option<i64>,
    pub busy_timeout_ms: Option<u64>,
    pub wal_autocheckpoint: Option<i64>,
}

impl SqliteTuningConfig {
    fn from_env() -> Self {
        Self {
            cache_size: env_parse("SQLITE_CACHE_SIZE"),
            temp_store: std::env::var("SQLITE_TEMP_STORE").ok(),
            mmap_size: env_parse("SQLITE_MMAP_SIZE"),
            page_size: env_parse("SQLITE_PAGE_SIZE"),
            busy_timeout_ms: env_parse("SQLITE_BUSY_TIMEOUT"),
            wal_autocheckpoint: env_parse("SQLITE_WAL_AUTOCHECKPOINT"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// The resolved, validated service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Used to build child-group upstream URLs: `http://127.0.0.1:<port>/proxy/<parent>`.
    pub port: u16,
    pub database_url: String,
    pub dialect: Dialect,
    pub db_lookup_timeout: Duration,
    pub sqlite_tuning: SqliteTuningConfig,
    pub log_level: String,
    /// The AES-256 key backing `core::crypto::AesGcmCryptoBox`, out of band
    /// ("encryption primitives treated as a black-box"). Hex
    /// encoded in `KEYGATE_ENCRYPTION_KEY`.
    pub encryption_key: [u8; 32],
    /// Port the Prometheus `/metrics` endpoint listens on.
    pub metrics_port: u16,
}

impl Config {
    /// Builds configuration from the process environment; no config-file
    /// loading is in scope for this service.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow!("DATABASE_URL environment variable is required"))?;
        let dialect = Dialect::from_database_url(&database_url)?;

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let db_lookup_timeout_ms = std::env::var("DB_LOOKUP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_DB_LOOKUP_TIMEOUT_MS)
            .max(MIN_DB_LOOKUP_TIMEOUT_MS);

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let encryption_key = match std::env::var("KEYGATE_ENCRYPTION_KEY") {
            Ok(hex_key) => {
                let bytes = hex::decode(hex_key.trim())
                    .map_err(|e| anyhow!("KEYGATE_ENCRYPTION_KEY must be hex-encoded: {e}"))?;
                bytes
                    .try_into()
                    .map_err(|_| anyhow!("KEYGATE_ENCRYPTION_KEY must decode to exactly 32 bytes"))?
            }
            Err(_) => return Err(anyhow!("KEYGATE_ENCRYPTION_KEY environment variable is required")),
        };

        let metrics_port = std::env::var("METRICS_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_METRICS_PORT);

        let config = Config {
            port,
            database_url,
            dialect,
            db_lookup_timeout: Duration::from_millis(db_lookup_timeout_ms),
            sqlite_tuning: SqliteTuningConfig::from_env(),
            log_level,
            encryption_key,
            metrics_port,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.database_url.trim().is_empty() {
            return Err(anyhow!("database_url cannot be empty"));
        }
        if self.db_lookup_timeout < Duration::from_millis(MIN_DB_LOOKUP_TIMEOUT_MS) {
            return Err(anyhow!(
                "db_lookup_timeout cannot be below {MIN_DB_LOOKUP_TIMEOUT_MS}ms"
            ));
        }
        if self.metrics_port == 0 {
            return Err(anyhow!("metrics_port cannot be 0"));
        }
        Ok(())
    }

    /// The local proxy URL a child group's upstream must point at.
    pub fn child_upstream_url(&self, parent_name: &str) -> String {
        format!("http://127.0.0.1:{}/proxy/{parent_name}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_detection_covers_all_three_schemes() {
        assert_eq!(
            Dialect::from_database_url("sqlite://data.db").unwrap(),
            Dialect::Sqlite
        );
        assert_eq!(
            Dialect::from_database_url("mysql://localhost/db").unwrap(),
            Dialect::MySql
        );
        assert_eq!(
            Dialect::from_database_url("postgres://localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert!(Dialect::from_database_url("mongodb://localhost").is_err());
    }

    #[test]
    fn child_upstream_url_matches_the_fixed_shape() {
        let cfg = Config {
            port: 3001,
            database_url: "sqlite::memory:".into(),
            dialect: Dialect::Sqlite,
            db_lookup_timeout: Duration::from_millis(1200),
            sqlite_tuning: SqliteTuningConfig::default(),
            log_level: "info".into(),
            encryption_key: [7u8; 32],
            metrics_port: 9090,
        };
        assert_eq!(
            cfg.child_upstream_url("p1"),
            "http://127.0.0.1:3001/proxy/p1"
        );
    }
}
