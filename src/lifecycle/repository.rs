// Repository pattern - isolates all database side effects of the lifecycle
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::authority::Role;
use crate::db::{rows, with_conn, StoreError};
use crate::ids::UserId;
use crate::lifecycle::domain::{ContentKind, DeletionMark, ModeratedEntity};
use crate::state::DbPool;

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Load an entity regardless of its deletion state
    async fn load(&self, kind: ContentKind, id: &str) -> Result<Option<ModeratedEntity>, StoreError>;

    /// Conditional write: only marks an active entity. False when it was
    /// already deleted (e.g. by a concurrent request).
    async fn mark_deleted(
        &self,
        kind: ContentKind,
        id: &str,
        mark: &DeletionMark,
    ) -> Result<bool, StoreError>;

    /// Conditional write: only clears a deleted entity
    async fn clear_deletion(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError>;

    /// Irreversibly remove a soft-deleted entity and everything cascading from it
    async fn purge(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError>;
}

pub type DynContentRepository = Arc<dyn ContentRepository>;

pub struct SqliteContentRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteContentRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn table(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Post => "posts",
        ContentKind::Comment => "comments",
        ContentKind::Account => "users",
    }
}

fn owner_column(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Post | ContentKind::Comment => "user_id",
        ContentKind::Account => "id",
    }
}

type RawEntity = (String, String, String, Option<String>, Option<String>, Option<String>);

fn into_entity(kind: ContentKind, raw: RawEntity) -> Result<ModeratedEntity, StoreError> {
    let (id, owner_id, role, deleted_at, reason, deleted_by) = raw;
    let owner_role = rows::parse_enum("role", &role, Role::parse)?;
    let deleted_at = rows::parse_optional_timestamp("deleted_at", deleted_at)?;

    let deletion = match deleted_at {
        Some(deleted_at) => Some(DeletionMark {
            deleted_at,
            reason,
            deleted_by: UserId::new(deleted_by.unwrap_or_default()),
        }),
        None => None,
    };

    Ok(ModeratedEntity {
        kind,
        id,
        owner_id: UserId::new(owner_id),
        owner_role,
        deletion,
    })
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn load(&self, kind: ContentKind, id: &str) -> Result<Option<ModeratedEntity>, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT t.id, t.{owner}, u.role, t.deleted_at, t.deletion_reason, t.deleted_by
                 FROM {table} t
                 JOIN users u ON u.id = t.{owner}
                 WHERE t.id = ?1",
                owner = owner_column(kind),
                table = table(kind),
            );
            let raw: Option<RawEntity> = conn
                .query_row(&sql, params![id], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .optional()?;

            raw.map(|r| into_entity(kind, r)).transpose()
        })
        .await
    }

    async fn mark_deleted(
        &self,
        kind: ContentKind,
        id: &str,
        mark: &DeletionMark,
    ) -> Result<bool, StoreError> {
        let id = id.to_string();
        let mark = mark.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "UPDATE {} SET deleted_at = ?2, deletion_reason = ?3, deleted_by = ?4
                 WHERE id = ?1 AND deleted_at IS NULL",
                table(kind)
            );
            let changed = conn.execute(
                &sql,
                params![
                    id,
                    rows::timestamp(mark.deleted_at),
                    mark.reason,
                    mark.deleted_by.as_str()
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn clear_deletion(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "UPDATE {} SET deleted_at = NULL, deletion_reason = NULL, deleted_by = NULL
                 WHERE id = ?1 AND deleted_at IS NOT NULL",
                table(kind)
            );
            Ok(conn.execute(&sql, params![id])? > 0)
        })
        .await
    }

    async fn purge(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "DELETE FROM {} WHERE id = ?1 AND deleted_at IS NOT NULL",
                table(kind)
            );
            Ok(conn.execute(&sql, params![id])? > 0)
        })
        .await
    }
}
