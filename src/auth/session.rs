// Session rows: creation, lookup and removal
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::time::Duration;

use crate::authority::{Actor, Role};
use crate::db::{rows, with_conn, StoreError};
use crate::ids::UserId;
use crate::state::DbPool;

/// The account behind a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    #[serde(flatten)]
    pub actor: Actor,
    pub username: String,
}

/// Create a new session for a user. Returns the session token.
pub async fn create_session(
    pool: &DbPool,
    timeout: Duration,
    user_id: &UserId,
    hours: u64,
) -> Result<String, StoreError> {
    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let user_id = user_id.clone();
    let session_token = token.clone();

    with_conn(pool, timeout, move |conn| {
        conn.execute(
            "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
            params![id, user_id.as_str(), session_token, format!("+{} hours", hours)],
        )?;
        Ok(())
    })
    .await?;

    Ok(token)
}

/// Delete a session by token.
pub async fn delete_session(pool: &DbPool, timeout: Duration, token: &str) -> Result<(), StoreError> {
    let token = token.to_string();
    with_conn(pool, timeout, move |conn| {
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    })
    .await
}

/// Resolve an unexpired token to its account. Soft-deleted accounts do not
/// authenticate.
pub async fn resolve_session(
    pool: &DbPool,
    timeout: Duration,
    token: &str,
) -> Result<Option<SessionUser>, StoreError> {
    let token = token.to_string();
    with_conn(pool, timeout, move |conn| {
        let raw: Option<(String, String, String, bool)> = conn
            .query_row(
                "SELECT u.id, u.username, u.role, u.is_blocked FROM sessions s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1
                   AND s.expires_at > datetime('now')
                   AND u.deleted_at IS NULL",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        raw.map(|(id, username, role, is_blocked)| {
            Ok::<_, StoreError>(SessionUser {
                actor: Actor {
                    id: UserId::new(id),
                    role: rows::parse_enum("role", &role, Role::parse)?,
                    is_blocked,
                },
                username,
            })
        })
        .transpose()
    })
    .await
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn create_test_pool() -> (DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("INSERT INTO users (id, username, role) VALUES ('u1', 'alice', 'moderator');")
            .unwrap();
        (pool, temp_dir)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[tokio::test]
    async fn session_resolves_until_deleted() {
        let (pool, _temp) = create_test_pool();
        let token = create_session(&pool, TIMEOUT, &UserId::new("u1"), 24).await.unwrap();

        let user = resolve_session(&pool, TIMEOUT, &token).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.actor.role, Role::Moderator);

        delete_session(&pool, TIMEOUT, &token).await.unwrap();
        assert!(resolve_session(&pool, TIMEOUT, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_accounts_and_expired_sessions_do_not_resolve() {
        let (pool, _temp) = create_test_pool();
        let token = create_session(&pool, TIMEOUT, &UserId::new("u1"), 24).await.unwrap();

        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO sessions (id, user_id, token, expires_at)
                     VALUES ('s-old', 'u1', 'stale', datetime('now', '-1 hours'));
                 UPDATE users SET deleted_at = '2026-01-01T00:00:00Z' WHERE id = 'u1';",
            )
            .unwrap();

        assert!(resolve_session(&pool, TIMEOUT, "stale").await.unwrap().is_none());
        assert!(resolve_session(&pool, TIMEOUT, &token).await.unwrap().is_none());
    }
}
