use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::approval::ApprovalState;
use crate::db::{insert_outcome, rows, with_conn, InsertOutcome, StoreError};
use crate::ids::{ApplicationId, JobId, UserId};
use crate::jobs::domain::{ApplicationStatus, JobApplication, JobListing};
use crate::state::DbPool;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn load_listing(&self, job_id: &str) -> Result<Option<JobListing>, StoreError>;

    async fn insert_listing(&self, listing: &JobListing) -> Result<(), StoreError>;

    async fn set_active(&self, job_id: &str, active: bool) -> Result<bool, StoreError>;

    async fn load_application(&self, id: &str) -> Result<Option<JobApplication>, StoreError>;

    /// Relies on the UNIQUE (job_id, applicant_id) constraint
    async fn insert_application(
        &self,
        application: &JobApplication,
    ) -> Result<InsertOutcome, StoreError>;

    /// Compare-and-swap on status. False when `expected` no longer holds.
    async fn save_review(
        &self,
        application: &JobApplication,
        expected: ApplicationStatus,
    ) -> Result<bool, StoreError>;

    async fn applications_for(&self, job_id: &str) -> Result<Vec<JobApplication>, StoreError>;
}

pub type DynJobRepository = Arc<dyn JobRepository>;

pub struct SqliteJobRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteJobRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

const APPLICATION_COLUMNS: &str =
    "id, job_id, applicant_id, cover_letter, status, applied_at, reviewed_by, reviewed_at";

fn read_application(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawApplication> {
    Ok(RawApplication {
        id: row.get(0)?,
        job_id: row.get(1)?,
        applicant_id: row.get(2)?,
        cover_letter: row.get(3)?,
        status: row.get(4)?,
        applied_at: row.get(5)?,
        reviewed_by: row.get(6)?,
        reviewed_at: row.get(7)?,
    })
}

struct RawApplication {
    id: String,
    job_id: String,
    applicant_id: String,
    cover_letter: Option<String>,
    status: String,
    applied_at: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
}

impl RawApplication {
    fn into_application(self) -> Result<JobApplication, StoreError> {
        Ok(JobApplication {
            id: ApplicationId::new(self.id),
            job_id: JobId::new(self.job_id),
            applicant_id: UserId::new(self.applicant_id),
            cover_letter: self.cover_letter,
            status: rows::parse_enum("status", &self.status, ApplicationStatus::parse)?,
            applied_at: rows::parse_timestamp("applied_at", &self.applied_at)?,
            reviewed_by: self.reviewed_by.map(UserId::new),
            reviewed_at: rows::parse_optional_timestamp("reviewed_at", self.reviewed_at)?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn load_listing(&self, job_id: &str) -> Result<Option<JobListing>, StoreError> {
        let job_id = job_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let raw: Option<(String, String, String, String, Option<String>, bool, String, String)> =
                conn.query_row(
                    "SELECT id, owner_id, title, description, location, is_active, approval_status, created_at
                     FROM jobs WHERE id = ?1",
                    params![job_id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    },
                )
                .optional()?;

            raw.map(
                |(id, owner_id, title, description, location, is_active, approval, created_at)| {
                    Ok::<_, StoreError>(JobListing {
                        id: JobId::new(id),
                        owner_id: UserId::new(owner_id),
                        title,
                        description,
                        location,
                        is_active,
                        approval: rows::parse_enum(
                            "approval_status",
                            &approval,
                            ApprovalState::parse,
                        )?,
                        created_at: rows::parse_timestamp("created_at", &created_at)?,
                    })
                },
            )
            .transpose()
        })
        .await
    }

    async fn insert_listing(&self, listing: &JobListing) -> Result<(), StoreError> {
        let l = listing.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            conn.execute(
                "INSERT INTO jobs (id, owner_id, title, description, location, is_active, approval_status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    l.id.as_str(),
                    l.owner_id.as_str(),
                    l.title,
                    l.description,
                    l.location,
                    l.is_active,
                    l.approval.as_str(),
                    rows::timestamp(l.created_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_active(&self, job_id: &str, active: bool) -> Result<bool, StoreError> {
        let job_id = job_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let changed = conn.execute(
                "UPDATE jobs SET is_active = ?2 WHERE id = ?1",
                params![job_id, active],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn load_application(&self, id: &str) -> Result<Option<JobApplication>, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT {} FROM job_applications WHERE id = ?1",
                APPLICATION_COLUMNS
            );
            let raw = conn.query_row(&sql, params![id], read_application).optional()?;
            raw.map(RawApplication::into_application).transpose()
        })
        .await
    }

    async fn insert_application(
        &self,
        application: &JobApplication,
    ) -> Result<InsertOutcome, StoreError> {
        let a = application.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            insert_outcome(conn.execute(
                "INSERT INTO job_applications (id, job_id, applicant_id, cover_letter, status, applied_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    a.id.as_str(),
                    a.job_id.as_str(),
                    a.applicant_id.as_str(),
                    a.cover_letter,
                    a.status.as_str(),
                    rows::timestamp(a.applied_at)
                ],
            ))
        })
        .await
    }

    async fn save_review(
        &self,
        application: &JobApplication,
        expected: ApplicationStatus,
    ) -> Result<bool, StoreError> {
        let a = application.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let changed = conn.execute(
                "UPDATE job_applications
                 SET status = ?2, reviewed_by = ?3, reviewed_at = ?4
                 WHERE id = ?1 AND status = ?5",
                params![
                    a.id.as_str(),
                    a.status.as_str(),
                    a.reviewed_by.as_ref().map(|u| u.as_str()),
                    a.reviewed_at.map(rows::timestamp),
                    expected.as_str()
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn applications_for(&self, job_id: &str) -> Result<Vec<JobApplication>, StoreError> {
        let job_id = job_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT {} FROM job_applications WHERE job_id = ?1 ORDER BY applied_at, id",
                APPLICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(params![job_id], read_application)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(RawApplication::into_application).collect()
        })
        .await
    }
}
