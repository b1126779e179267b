pub mod rows;
mod store;

pub use store::{
    immediate, insert_outcome, is_unique_violation, with_conn, InsertOutcome, StoreError,
};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        include_str!("../../migrations/001_initial.sql"),
    ),
    (
        "002_content",
        include_str!("../../migrations/002_content.sql"),
    ),
    (
        "003_events_jobs",
        include_str!("../../migrations/003_events_jobs.sql"),
    ),
    (
        "004_surveys",
        include_str!("../../migrations/004_surveys.sql"),
    ),
];

/// Per-connection setup. Runs on every connection the pool opens so that
/// foreign keys and the busy timeout hold for all of them, not just the first.
fn configure_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);
    let pool = Pool::builder().max_size(8).build(manager)?;

    // WAL is persistent on the database file, one connection is enough
    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Promote an existing account to admin. Used to bootstrap the first admin,
/// since role changes otherwise require an admin actor.
pub fn promote_admin(pool: &DbPool, username: &str) -> anyhow::Result<()> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE users SET role = 'admin' WHERE username = ?1 AND deleted_at IS NULL",
        params![username],
    )?;
    if rows == 0 {
        anyhow::bail!("No active account named '{}'", username);
    }
    tracing::info!(username, "Promoted account to admin");
    Ok(())
}
