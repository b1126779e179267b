use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::approval::domain::{ApprovalState, GatedItem, GatedKind};
use crate::db::{rows, with_conn, StoreError};
use crate::ids::UserId;
use crate::state::DbPool;

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Load a live (not soft-deleted) gated item
    async fn load(&self, kind: GatedKind, id: &str) -> Result<Option<GatedItem>, StoreError>;

    /// Compare-and-swap on the approval state. False when `expected` no
    /// longer holds.
    async fn save_decision(
        &self,
        item: &GatedItem,
        expected: ApprovalState,
    ) -> Result<bool, StoreError>;

    /// Oldest first
    async fn pending(&self, kind: GatedKind, limit: u32) -> Result<Vec<GatedItem>, StoreError>;
}

pub type DynApprovalRepository = Arc<dyn ApprovalRepository>;

pub struct SqliteApprovalRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteApprovalRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

fn select_sql(kind: GatedKind) -> &'static str {
    match kind {
        GatedKind::Event => {
            "SELECT id, user_id, title, approval_status, reviewed_by, reviewed_at, created_at
             FROM posts
             WHERE post_type = 'event' AND deleted_at IS NULL"
        }
        GatedKind::JobListing => {
            "SELECT id, owner_id, title, approval_status, reviewed_by, reviewed_at, created_at
             FROM jobs
             WHERE 1 = 1"
        }
    }
}

fn table(kind: GatedKind) -> &'static str {
    match kind {
        GatedKind::Event => "posts",
        GatedKind::JobListing => "jobs",
    }
}

type RawItem = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawItem> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_item(kind: GatedKind, raw: RawItem) -> Result<GatedItem, StoreError> {
    let (id, owner_id, title, approval, reviewed_by, reviewed_at, created_at) = raw;
    Ok(GatedItem {
        kind,
        id,
        owner_id: UserId::new(owner_id),
        title,
        approval: rows::parse_enum("approval_status", &approval, ApprovalState::parse)?,
        reviewed_by: reviewed_by.map(UserId::new),
        reviewed_at: rows::parse_optional_timestamp("reviewed_at", reviewed_at)?,
        created_at: rows::parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ApprovalRepository for SqliteApprovalRepository {
    async fn load(&self, kind: GatedKind, id: &str) -> Result<Option<GatedItem>, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!("{} AND id = ?1", select_sql(kind));
            let raw = conn.query_row(&sql, params![id], read_raw).optional()?;
            raw.map(|r| into_item(kind, r)).transpose()
        })
        .await
    }

    async fn save_decision(
        &self,
        item: &GatedItem,
        expected: ApprovalState,
    ) -> Result<bool, StoreError> {
        let item = item.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "UPDATE {} SET approval_status = ?2, reviewed_by = ?3, reviewed_at = ?4
                 WHERE id = ?1 AND approval_status = ?5",
                table(item.kind)
            );
            let changed = conn.execute(
                &sql,
                params![
                    item.id,
                    item.approval.as_str(),
                    item.reviewed_by.as_ref().map(|u| u.as_str()),
                    item.reviewed_at.map(rows::timestamp),
                    expected.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn pending(&self, kind: GatedKind, limit: u32) -> Result<Vec<GatedItem>, StoreError> {
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "{} AND approval_status = 'pending' ORDER BY created_at ASC LIMIT ?1",
                select_sql(kind)
            );
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(params![limit], read_raw)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(|r| into_item(kind, r)).collect()
        })
        .await
    }
}
