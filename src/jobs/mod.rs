pub mod domain;
pub mod repository;

pub use domain::{ApplicationStatus, JobApplication, JobListing, NewJobListing, ReviewAction};
pub use repository::{DynJobRepository, JobRepository, SqliteJobRepository};

use chrono::{DateTime, Utc};

use crate::authority::{Actor, Capability, RoleAuthority};
use crate::db::InsertOutcome;
use crate::engine::{EngineError, EngineResult, Transition};

/// Compare-and-swap attempts before giving up on a contended application
const MAX_REVIEW_ATTEMPTS: usize = 3;

/// Job listings and the application review pipeline
pub struct JobApplicationPipeline {
    repo: DynJobRepository,
}

impl JobApplicationPipeline {
    pub fn new(repo: DynJobRepository) -> Self {
        Self { repo }
    }

    async fn load_listing(&self, job_id: &str) -> EngineResult<JobListing> {
        self.repo
            .load_listing(job_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("job {}", job_id)))
    }

    pub async fn post_listing(
        &self,
        actor: &Actor,
        listing: NewJobListing,
        now: DateTime<Utc>,
    ) -> EngineResult<JobListing> {
        RoleAuthority::require(actor, &actor.own_account(), Capability::Participate)?;
        let listing = listing.into_listing(actor, now)?;
        self.repo.insert_listing(&listing).await?;

        tracing::info!(job_id = %listing.id, owner = %actor.id, "Job listing submitted for review");
        Ok(listing)
    }

    /// Open or close a listing for new applications
    pub async fn set_active(
        &self,
        actor: &Actor,
        job_id: &str,
        active: bool,
    ) -> EngineResult<JobListing> {
        let listing = self.load_listing(job_id).await?;
        RoleAuthority::require(actor, &listing.target(), Capability::Edit)?;

        if listing.is_active == active {
            return Ok(listing);
        }
        if !self.repo.set_active(job_id, active).await? {
            return Err(EngineError::not_found(format!("job {}", job_id)));
        }

        tracing::info!(job_id, active, actor = %actor.id, "Job listing toggled");
        Ok(JobListing {
            is_active: active,
            ..listing
        })
    }

    pub async fn apply(
        &self,
        actor: &Actor,
        job_id: &str,
        cover_letter: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<JobApplication> {
        let listing = self.load_listing(job_id).await?;
        listing.check_accepting(actor)?;

        let application = JobApplication::new(listing.id.clone(), actor, cover_letter, now)?;
        match self.repo.insert_application(&application).await? {
            InsertOutcome::Inserted => {
                tracing::info!(job_id, applicant = %actor.id, "Job application received");
                Ok(application)
            }
            InsertOutcome::Duplicate => Err(EngineError::AlreadyApplied),
        }
    }

    pub async fn mark_reviewed(
        &self,
        actor: &Actor,
        application_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<JobApplication> {
        self.review(actor, application_id, ReviewAction::MarkReviewed, now)
            .await
    }

    pub async fn accept(
        &self,
        actor: &Actor,
        application_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<JobApplication> {
        self.review(actor, application_id, ReviewAction::Accept, now)
            .await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        application_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<JobApplication> {
        self.review(actor, application_id, ReviewAction::Reject, now)
            .await
    }

    async fn review(
        &self,
        actor: &Actor,
        application_id: &str,
        action: ReviewAction,
        now: DateTime<Utc>,
    ) -> EngineResult<JobApplication> {
        for _ in 0..MAX_REVIEW_ATTEMPTS {
            let application = self
                .repo
                .load_application(application_id)
                .await?
                .ok_or_else(|| EngineError::not_found(format!("application {}", application_id)))?;
            let listing = self.load_listing(application.job_id.as_str()).await?;
            listing.check_reviewer(actor)?;

            let expected = application.status;
            match application.review(actor, action, now)? {
                Transition::Unchanged(current) => return Ok(current),
                Transition::Changed(next) => {
                    if self.repo.save_review(&next, expected).await? {
                        tracing::info!(
                            application_id,
                            from = %expected,
                            to = %next.status,
                            reviewer = %actor.id,
                            "Application status changed"
                        );
                        return Ok(next);
                    }
                }
            }
        }

        Err(EngineError::Transient(format!(
            "application {} changed concurrently",
            application_id
        )))
    }

    /// All applications to a listing, for its reviewers
    pub async fn applications(
        &self,
        actor: &Actor,
        job_id: &str,
    ) -> EngineResult<Vec<JobApplication>> {
        let listing = self.load_listing(job_id).await?;
        listing.check_reviewer(actor)?;
        Ok(self.repo.applications_for(job_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalState;
    use crate::authority::Role;
    use crate::db;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_pipeline() -> (JobApplicationPipeline, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO users (id, username) VALUES ('hr', 'hr'), ('nurse', 'nurse');
                 INSERT INTO jobs (id, owner_id, title, description, approval_status, created_at)
                     VALUES ('open', 'hr', 'Midwife', 'Days', 'published', '2026-01-01T00:00:00+00:00'),
                            ('unreviewed', 'hr', 'Porter', 'Nights', 'pending', '2026-01-01T00:00:00+00:00');",
            )
            .unwrap();

        let repo = Arc::new(SqliteJobRepository::new(pool, Duration::from_secs(5)));
        (JobApplicationPipeline::new(repo), temp_dir)
    }

    #[tokio::test]
    async fn accept_twice_returns_accepted() {
        let (pipeline, _temp) = create_test_pipeline();
        let hr = Actor::new("hr", Role::User);
        let nurse = Actor::new("nurse", Role::User);

        let app = pipeline
            .apply(&nurse, "open", Some("Ten years on labour ward".into()), Utc::now())
            .await
            .unwrap();

        let reviewed = pipeline.mark_reviewed(&hr, app.id.as_str(), Utc::now()).await.unwrap();
        assert_eq!(reviewed.status, ApplicationStatus::Reviewed);

        let first = pipeline.accept(&hr, app.id.as_str(), Utc::now()).await.unwrap();
        let second = pipeline.accept(&hr, app.id.as_str(), Utc::now()).await.unwrap();
        assert_eq!(first.status, ApplicationStatus::Accepted);
        assert_eq!(second.status, ApplicationStatus::Accepted);

        // Never moves backwards
        let still = pipeline.mark_reviewed(&hr, app.id.as_str(), Utc::now()).await.unwrap();
        assert_eq!(still.status, ApplicationStatus::Accepted);

        assert!(matches!(
            pipeline.reject(&hr, app.id.as_str(), Utc::now()).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_application_is_already_applied() {
        let (pipeline, _temp) = create_test_pipeline();
        let nurse = Actor::new("nurse", Role::User);
        pipeline.apply(&nurse, "open", None, Utc::now()).await.unwrap();
        assert_eq!(
            pipeline.apply(&nurse, "open", None, Utc::now()).await.unwrap_err(),
            EngineError::AlreadyApplied
        );
    }

    #[tokio::test]
    async fn closed_or_unreviewed_listing_is_forbidden() {
        let (pipeline, _temp) = create_test_pipeline();
        let hr = Actor::new("hr", Role::User);
        let nurse = Actor::new("nurse", Role::User);

        assert_eq!(
            pipeline.apply(&nurse, "unreviewed", None, Utc::now()).await.unwrap_err(),
            EngineError::Forbidden
        );

        let closed = pipeline.set_active(&hr, "open", false).await.unwrap();
        assert!(!closed.is_active);
        assert_eq!(
            pipeline.apply(&nurse, "open", None, Utc::now()).await.unwrap_err(),
            EngineError::Forbidden
        );
    }

    #[tokio::test]
    async fn strangers_cannot_review_or_toggle() {
        let (pipeline, _temp) = create_test_pipeline();
        let nurse = Actor::new("nurse", Role::User);
        let app = pipeline.apply(&nurse, "open", None, Utc::now()).await.unwrap();

        // Applicants do not review their own application
        assert_eq!(
            pipeline.accept(&nurse, app.id.as_str(), Utc::now()).await.unwrap_err(),
            EngineError::Forbidden
        );
        assert_eq!(
            pipeline.set_active(&nurse, "open", false).await.unwrap_err(),
            EngineError::Forbidden
        );
        assert_eq!(
            pipeline.applications(&nurse, "open").await.unwrap_err(),
            EngineError::Forbidden
        );

        let mo = Actor::new("mo", Role::Moderator);
        assert_eq!(pipeline.applications(&mo, "open").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn posted_listing_waits_for_approval() {
        let (pipeline, _temp) = create_test_pipeline();
        let hr = Actor::new("hr", Role::User);
        let listing = pipeline
            .post_listing(
                &hr,
                NewJobListing {
                    title: "Pharmacist".into(),
                    description: "Community".into(),
                    location: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(listing.approval, ApprovalState::Pending);

        let nurse = Actor::new("nurse", Role::User);
        assert_eq!(
            pipeline
                .apply(&nurse, listing.id.as_str(), None, Utc::now())
                .await
                .unwrap_err(),
            EngineError::Forbidden
        );
    }
}
