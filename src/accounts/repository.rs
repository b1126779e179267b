use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::accounts::domain::{Account, UnblockRequest};
use crate::authority::Role;
use crate::db::{immediate, rows, with_conn, StoreError};
use crate::ids::UserId;
use crate::state::DbPool;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Soft-deleted accounts are not returned
    async fn load(&self, user_id: &str) -> Result<Option<Account>, StoreError>;

    /// Compare-and-swap on the blocked flag. Unblocking also closes any
    /// open unblock request.
    async fn set_blocked(&self, user_id: &str, blocked: bool) -> Result<bool, StoreError>;

    /// Compare-and-swap on the role
    async fn set_role(&self, user_id: &str, role: Role, expected: Role) -> Result<bool, StoreError>;

    /// One open request per user; a resubmission replaces it
    async fn upsert_unblock_request(&self, request: &UnblockRequest) -> Result<(), StoreError>;

    /// Oldest first, blocked live accounts only
    async fn unblock_requests(&self, limit: u32) -> Result<Vec<UnblockRequest>, StoreError>;
}

pub type DynAccountRepository = Arc<dyn AccountRepository>;

pub struct SqliteAccountRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn load(&self, user_id: &str) -> Result<Option<Account>, StoreError> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let raw: Option<(String, String, Option<String>, String, bool, String)> = conn
                .query_row(
                    "SELECT id, username, display_name, role, is_blocked, created_at
                     FROM users WHERE id = ?1 AND deleted_at IS NULL",
                    params![user_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()?;

            raw.map(|(id, username, display_name, role, is_blocked, created_at)| {
                Ok::<_, StoreError>(Account {
                    id: UserId::new(id),
                    username,
                    display_name,
                    role: rows::parse_enum("role", &role, Role::parse)?,
                    is_blocked,
                    created_at: rows::parse_timestamp("created_at", &created_at)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn set_blocked(&self, user_id: &str, blocked: bool) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            immediate(conn, |tx| {
                let changed = tx.execute(
                    "UPDATE users SET is_blocked = ?2
                     WHERE id = ?1 AND is_blocked = ?3 AND deleted_at IS NULL",
                    params![user_id, blocked, !blocked],
                )?;
                if changed > 0 && !blocked {
                    tx.execute(
                        "DELETE FROM unblock_requests WHERE user_id = ?1",
                        params![user_id],
                    )?;
                }
                Ok(changed > 0)
            })
        })
        .await
    }

    async fn set_role(&self, user_id: &str, role: Role, expected: Role) -> Result<bool, StoreError> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2
                 WHERE id = ?1 AND role = ?3 AND deleted_at IS NULL",
                params![user_id, role.as_str(), expected.as_str()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn upsert_unblock_request(&self, request: &UnblockRequest) -> Result<(), StoreError> {
        let r = request.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            conn.execute(
                "INSERT INTO unblock_requests (user_id, message, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                     message = excluded.message,
                     created_at = excluded.created_at",
                params![r.user_id.as_str(), r.message, rows::timestamp(r.created_at)],
            )?;
            Ok(())
        })
        .await
    }

    async fn unblock_requests(&self, limit: u32) -> Result<Vec<UnblockRequest>, StoreError> {
        with_conn(&self.pool, self.timeout, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT r.user_id, r.message, r.created_at
                 FROM unblock_requests r
                 JOIN users u ON u.id = r.user_id
                 WHERE u.is_blocked = 1 AND u.deleted_at IS NULL
                 ORDER BY r.created_at
                 LIMIT ?1",
            )?;
            let raws = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raws.into_iter()
                .map(|(user_id, message, created_at)| {
                    Ok::<_, StoreError>(UnblockRequest {
                        user_id: UserId::new(user_id),
                        message,
                        created_at: rows::parse_timestamp("created_at", &created_at)?,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteAccountRepository, DbPool, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO users (id, username, display_name) VALUES ('bob', 'bob', 'Bob R.');
                 INSERT INTO users (id, username, deleted_at) VALUES ('gone', 'gone', '2026-01-01T00:00:00Z');",
            )
            .unwrap();
        (
            SqliteAccountRepository::new(pool.clone(), Duration::from_secs(5)),
            pool,
            temp_dir,
        )
    }

    #[tokio::test]
    async fn test_load_skips_deleted_accounts() {
        let (repo, _pool, _temp) = create_test_repo();
        let bob = repo.load("bob").await.unwrap().unwrap();
        assert_eq!(bob.display_name.as_deref(), Some("Bob R."));
        assert_eq!(bob.role, Role::User);
        assert!(repo.load("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_block_flag_compare_and_swap() {
        let (repo, _pool, _temp) = create_test_repo();
        assert!(repo.set_blocked("bob", true).await.unwrap());
        assert!(!repo.set_blocked("bob", true).await.unwrap());
        assert!(repo.load("bob").await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test]
    async fn test_unblock_request_overwrites_and_clears() {
        let (repo, pool, _temp) = create_test_repo();
        repo.set_blocked("bob", true).await.unwrap();

        for message in ["first", "second"] {
            repo.upsert_unblock_request(&UnblockRequest {
                user_id: UserId::new("bob"),
                message: Some(message.into()),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let open = repo.unblock_requests(10).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].message.as_deref(), Some("second"));

        repo.set_blocked("bob", false).await.unwrap();
        let remaining: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM unblock_requests", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_role_compare_and_swap() {
        let (repo, _pool, _temp) = create_test_repo();
        assert!(repo.set_role("bob", Role::Moderator, Role::User).await.unwrap());
        assert!(!repo.set_role("bob", Role::Admin, Role::User).await.unwrap());
        assert_eq!(repo.load("bob").await.unwrap().unwrap().role, Role::Moderator);
    }
}
