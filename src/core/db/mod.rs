// src/core/db/mod.rs

//! Dialect-aware database access. A single `DbPool` enum wraps the three
//! concrete sqlx pool types; callers branch on dialect wherever SQL syntax
//! actually differs (placeholders, upsert, batched delete) rather than
//! hiding the dialect behind a generic driver, since several components
//! (`BulkImport`, log retention) have behavior that differs per dialect.

pub mod placeholder;
pub mod pool;
pub mod schema;

pub use pool::{DbPool, DbTx};
