// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the service.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
///
/// Variants correspond to error *kinds*, not error *types* — callers match on
/// the kind to decide retry/user-facing behavior rather than downcasting.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Distinct from `Conflict` so callers can poll rather than retry-and-fail.
    #[error("a task is already running: {0}")]
    AlreadyRunning(String),

    #[error("database error: {0}")]
    Database(Arc<sqlx::Error>),

    /// A database or context error that is safe to retry, or to degrade to
    /// cached data in a read-only loader.
    #[error("transient error: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// A `Validation` error carrying a stable machine-readable `code` prefix
    /// (`"{code}: {msg}"`) so callers that need to distinguish one validation
    /// failure from another of the same kind can match on `code()` rather
    /// than the free-form message text.
    pub fn validation_with_code(code: &str, msg: impl Into<String>) -> Self {
        Self::Validation(format!("{code}: {}", msg.into()))
    }

    /// The leading `code` of a `Validation` error constructed via
    /// `validation_with_code`, if any — `None` for plain-message validation
    /// errors and for every other variant.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Validation(msg) => msg.split_once(": ").map(|(code, _)| code),
            _ => None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::ResourceNotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The single `IsTransient(err)` predicate: context cancellation/deadline
    /// and dialect-specific lock/timeout codes are all folded into one
    /// retry-or-degrade signal.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Transient(_) => true,
            AppError::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }
}

/// Classifies a raw `sqlx::Error` as transient (lock contention, timeout,
/// serialization failure, cancellation) per dialect. Non-transient DB errors
/// (constraint violations, syntax errors, missing tables) return `false`.
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return false;
            };
            match code.as_ref() {
                // SQLite: SQLITE_BUSY / SQLITE_LOCKED
                "5" | "6" => true,
                // MySQL: ER_LOCK_WAIT_TIMEOUT, ER_LOCK_DEADLOCK
                "1205" | "1213" => true,
                // Postgres: serialization_failure, deadlock_detected, lock_not_available
                "40001" | "40P01" | "55P03" => true,
                _ => false,
            }
        }
        _ => false,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(Arc::new(err))
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_running_is_distinct_from_conflict() {
        let a = AppError::AlreadyRunning("import".into());
        let b = AppError::Conflict("import".into());
        assert!(!matches!(a, AppError::Conflict(_)));
        assert!(!matches!(b, AppError::AlreadyRunning(_)));
    }

    #[test]
    fn transient_marker_propagates_through_database_variant() {
        let err = AppError::Transient("context cancelled".into());
        assert!(err.is_transient());
        let err = AppError::Validation("bad name".into());
        assert!(!err.is_transient());
    }
}
