// Bounded, off-runtime access to the SQLite pool
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use thiserror::Error;

use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store task failed: {0}")]
    Task(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Run `f` with a pooled connection on the blocking thread pool, giving up
/// after `timeout`. A timed-out call keeps running to completion in the
/// background; the caller only sees `StoreError::Timeout`.
pub async fn with_conn<T, F>(pool: &DbPool, timeout: Duration, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = pool.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(StoreError::Task(join_err.to_string())),
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Store call timed out");
            Err(StoreError::Timeout(timeout))
        }
    }
}

/// Run `f` inside `BEGIN IMMEDIATE`. The write lock is taken up front, so
/// reads inside `f` see no concurrent writer until COMMIT. Any failure,
/// including a failed COMMIT, rolls back before the connection returns to
/// the pool.
pub fn immediate<T, F>(conn: &mut Connection, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&Connection) -> Result<T, StoreError>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Result of an insert guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Map an insert result onto `InsertOutcome`, treating a UNIQUE or
/// PRIMARY KEY violation as a duplicate rather than an error.
pub fn insert_outcome(result: rusqlite::Result<usize>) -> Result<InsertOutcome, StoreError> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(e.into()),
    }
}

/// True when an insert hit a UNIQUE or PRIMARY KEY constraint
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
