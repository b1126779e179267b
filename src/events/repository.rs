// Repository pattern - registration storage and the guarded capacity write
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::approval::ApprovalState;
use crate::db::{immediate, insert_outcome, rows, with_conn, InsertOutcome, StoreError};
use crate::events::domain::{Event, EventDetails, EventRegistration, RegistrationStatus};
use crate::ids::{PostId, RegistrationId, UserId};
use crate::state::DbPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved,
    /// Still pending: every seat is taken
    Full,
    /// No longer pending; someone else decided first
    Stale,
}

#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// A live event post (not soft-deleted)
    async fn load_event(&self, event_id: &str) -> Result<Option<Event>, StoreError>;

    async fn load_registration(
        &self,
        id: &str,
    ) -> Result<Option<EventRegistration>, StoreError>;

    /// Relies on the UNIQUE (event_id, user_id) constraint
    async fn insert(&self, registration: &EventRegistration) -> Result<InsertOutcome, StoreError>;

    /// Pending → Approved only if approved seats stay within capacity.
    /// Atomic with respect to other approvals of the same event.
    async fn approve_within_capacity(
        &self,
        id: &RegistrationId,
        reviewer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ApproveOutcome, StoreError>;

    /// Compare-and-swap: Pending → Rejected
    async fn reject_pending(
        &self,
        id: &RegistrationId,
        reviewer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn for_event(&self, event_id: &str) -> Result<Vec<EventRegistration>, StoreError>;
}

pub type DynRegistrationRepository = Arc<dyn RegistrationRepository>;

pub struct SqliteRegistrationRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteRegistrationRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

const REGISTRATION_COLUMNS: &str =
    "id, event_id, user_id, status, created_at, reviewed_by, reviewed_at";

type RawRegistration = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

fn read_registration(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRegistration> {
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

fn into_registration(raw: RawRegistration) -> Result<EventRegistration, StoreError> {
    let (id, event_id, user_id, status, created_at, reviewed_by, reviewed_at) = raw;
    Ok(EventRegistration {
        id: RegistrationId::new(id),
        event_id: PostId::new(event_id),
        user_id: UserId::new(user_id),
        status: rows::parse_enum("status", &status, RegistrationStatus::parse)?,
        created_at: rows::parse_timestamp("created_at", &created_at)?,
        reviewed_by: reviewed_by.map(UserId::new),
        reviewed_at: rows::parse_optional_timestamp("reviewed_at", reviewed_at)?,
    })
}

fn current_status(conn: &Connection, id: &str) -> Result<Option<RegistrationStatus>, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM event_registrations WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    status
        .map(|s| rows::parse_enum("status", &s, RegistrationStatus::parse))
        .transpose()
}

#[async_trait]
impl RegistrationRepository for SqliteRegistrationRepository {
    async fn load_event(&self, event_id: &str) -> Result<Option<Event>, StoreError> {
        let event_id = event_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let raw: Option<(String, String, String, Option<String>, Option<String>, Option<u32>)> =
                conn.query_row(
                    "SELECT id, user_id, approval_status, event_date, registration_deadline, max_participants
                     FROM posts
                     WHERE id = ?1 AND post_type = 'event' AND deleted_at IS NULL",
                    params![event_id],
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

            raw.map(|(id, owner, approval, event_date, deadline, max)| {
                Ok::<_, StoreError>(Event {
                    id: PostId::new(id),
                    owner_id: UserId::new(owner),
                    approval: rows::parse_enum("approval_status", &approval, ApprovalState::parse)?,
                    details: EventDetails {
                        event_date: rows::parse_optional_date("event_date", event_date)?,
                        registration_deadline: rows::parse_optional_date(
                            "registration_deadline",
                            deadline,
                        )?,
                        max_participants: max,
                    },
                })
            })
            .transpose()
        })
        .await
    }

    async fn load_registration(
        &self,
        id: &str,
    ) -> Result<Option<EventRegistration>, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT {} FROM event_registrations WHERE id = ?1",
                REGISTRATION_COLUMNS
            );
            let raw = conn.query_row(&sql, params![id], read_registration).optional()?;
            raw.map(into_registration).transpose()
        })
        .await
    }

    async fn insert(&self, registration: &EventRegistration) -> Result<InsertOutcome, StoreError> {
        let reg = registration.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            insert_outcome(conn.execute(
                "INSERT INTO event_registrations (id, event_id, user_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    reg.id.as_str(),
                    reg.event_id.as_str(),
                    reg.user_id.as_str(),
                    reg.status.as_str(),
                    rows::timestamp(reg.created_at)
                ],
            ))
        })
        .await
    }

    async fn approve_within_capacity(
        &self,
        id: &RegistrationId,
        reviewer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ApproveOutcome, StoreError> {
        let id = id.clone();
        let reviewer = reviewer.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            immediate(conn, |tx| {
                // Single guarded write: count and update see the same snapshot
                // because IMMEDIATE holds the write lock.
                let changed = tx.execute(
                    "UPDATE event_registrations
                     SET status = 'approved', reviewed_by = ?2, reviewed_at = ?3
                     WHERE id = ?1
                       AND status = 'pending'
                       AND (SELECT COUNT(*) FROM event_registrations r
                            WHERE r.event_id = event_registrations.event_id
                              AND r.status = 'approved')
                           < COALESCE((SELECT p.max_participants FROM posts p
                                       WHERE p.id = event_registrations.event_id),
                                      9223372036854775807)",
                    params![id.as_str(), reviewer.as_str(), rows::timestamp(now)],
                )?;

                if changed > 0 {
                    return Ok(ApproveOutcome::Approved);
                }

                match current_status(tx, id.as_str())? {
                    Some(RegistrationStatus::Pending) => Ok(ApproveOutcome::Full),
                    _ => Ok(ApproveOutcome::Stale),
                }
            })
        })
        .await
    }

    async fn reject_pending(
        &self,
        id: &RegistrationId,
        reviewer: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let id = id.clone();
        let reviewer = reviewer.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let changed = conn.execute(
                "UPDATE event_registrations
                 SET status = 'rejected', reviewed_by = ?2, reviewed_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id.as_str(), reviewer.as_str(), rows::timestamp(now)],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn for_event(&self, event_id: &str) -> Result<Vec<EventRegistration>, StoreError> {
        let event_id = event_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT {} FROM event_registrations WHERE event_id = ?1 ORDER BY created_at, id",
                REGISTRATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(params![event_id], read_registration)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(into_registration).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn create_test_repo(max: Option<u32>) -> (SqliteRegistrationRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();

        let conn = pool.get().unwrap();
        conn.execute_batch(
            "INSERT INTO users (id, username) VALUES
                 ('alice', 'alice'), ('a', 'a'), ('b', 'b'), ('c', 'c');",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (id, user_id, post_type, body, approval_status,
                                event_date, registration_deadline, max_participants, created_at)
             VALUES ('e1', 'alice', 'event', 'Simulation day', 'published',
                     '2026-07-01', '2026-06-25', ?1, '2026-01-01T00:00:00+00:00')",
            params![max],
        )
        .unwrap();

        (
            SqliteRegistrationRepository::new(pool.clone(), Duration::from_secs(5)),
            temp_dir,
        )
    }

    async fn register(repo: &SqliteRegistrationRepository, user: &str) -> EventRegistration {
        let reg = EventRegistration::new(PostId::new("e1"), UserId::new(user), Utc::now());
        assert_eq!(repo.insert(&reg).await.unwrap(), InsertOutcome::Inserted);
        reg
    }

    #[tokio::test]
    async fn test_load_event_details() {
        let (repo, _temp) = create_test_repo(Some(2));
        let event = repo.load_event("e1").await.unwrap().unwrap();
        assert_eq!(event.approval, ApprovalState::Published);
        assert_eq!(event.details.max_participants, Some(2));
        assert_eq!(
            event.details.registration_deadline.map(crate::dates::to_storage).as_deref(),
            Some("2026-06-25")
        );
    }

    #[tokio::test]
    async fn test_duplicate_insert_reported() {
        let (repo, _temp) = create_test_repo(None);
        register(&repo, "a").await;

        let again = EventRegistration::new(PostId::new("e1"), UserId::new("a"), Utc::now());
        assert_eq!(repo.insert(&again).await.unwrap(), InsertOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_capacity_guard() {
        let (repo, _temp) = create_test_repo(Some(2));
        let mo = UserId::new("mo");
        let a = register(&repo, "a").await;
        let b = register(&repo, "b").await;
        let c = register(&repo, "c").await;

        assert_eq!(
            repo.approve_within_capacity(&a.id, &mo, Utc::now()).await.unwrap(),
            ApproveOutcome::Approved
        );
        assert_eq!(
            repo.approve_within_capacity(&b.id, &mo, Utc::now()).await.unwrap(),
            ApproveOutcome::Approved
        );
        assert_eq!(
            repo.approve_within_capacity(&c.id, &mo, Utc::now()).await.unwrap(),
            ApproveOutcome::Full
        );
        assert_eq!(
            repo.approve_within_capacity(&a.id, &mo, Utc::now()).await.unwrap(),
            ApproveOutcome::Stale
        );

        let c = repo.load_registration(c.id.as_str()).await.unwrap().unwrap();
        assert_eq!(c.status, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn test_unlimited_event_approves_everyone() {
        let (repo, _temp) = create_test_repo(None);
        let mo = UserId::new("mo");
        for user in ["a", "b", "c"] {
            let reg = register(&repo, user).await;
            assert_eq!(
                repo.approve_within_capacity(&reg.id, &mo, Utc::now()).await.unwrap(),
                ApproveOutcome::Approved
            );
        }
    }

    #[tokio::test]
    async fn test_reject_is_compare_and_swap() {
        let (repo, _temp) = create_test_repo(None);
        let mo = UserId::new("mo");
        let a = register(&repo, "a").await;

        assert!(repo.reject_pending(&a.id, &mo, Utc::now()).await.unwrap());
        assert!(!repo.reject_pending(&a.id, &mo, Utc::now()).await.unwrap());

        let roster = repo.for_event("e1").await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].status, RegistrationStatus::Rejected);
    }
}
