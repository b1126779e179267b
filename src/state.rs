use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::accounts::{AccountAdministration, SqliteAccountRepository};
use crate::approval::{ApprovalGate, SqliteApprovalRepository};
use crate::auth::Authenticator;
use crate::config::Config;
use crate::events::{EventRegistrationManager, SqliteRegistrationRepository};
use crate::feed::{Feed, SqliteFeedRepository};
use crate::jobs::{JobApplicationPipeline, SqliteJobRepository};
use crate::lifecycle::{ContentLifecycle, SqliteContentRepository};
use crate::surveys::{SqliteSurveyRepository, SurveyAggregator};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub auth: Arc<Authenticator>,
    pub lifecycle: Arc<ContentLifecycle>,
    pub approvals: Arc<ApprovalGate>,
    pub events: Arc<EventRegistrationManager>,
    pub jobs: Arc<JobApplicationPipeline>,
    pub surveys: Arc<SurveyAggregator>,
    pub feed: Arc<Feed>,
    pub accounts: Arc<AccountAdministration>,
}

impl AppState {
    /// Wire every manager to its SQLite repository over the shared pool
    pub fn new(db: DbPool, config: Config) -> Self {
        let timeout = config.engine.store_timeout();

        Self {
            auth: Arc::new(Authenticator::new(
                db.clone(),
                timeout,
                config.auth.bcrypt_cost,
                config.auth.session_hours,
            )),
            lifecycle: Arc::new(ContentLifecycle::new(Arc::new(
                SqliteContentRepository::new(db.clone(), timeout),
            ))),
            approvals: Arc::new(ApprovalGate::new(Arc::new(SqliteApprovalRepository::new(
                db.clone(),
                timeout,
            )))),
            events: Arc::new(EventRegistrationManager::new(
                Arc::new(SqliteRegistrationRepository::new(db.clone(), timeout)),
                config.engine.reference_offset(),
            )),
            jobs: Arc::new(JobApplicationPipeline::new(Arc::new(
                SqliteJobRepository::new(db.clone(), timeout),
            ))),
            surveys: Arc::new(SurveyAggregator::new(Arc::new(SqliteSurveyRepository::new(
                db.clone(),
                timeout,
            )))),
            feed: Arc::new(Feed::new(Arc::new(SqliteFeedRepository::new(
                db.clone(),
                timeout,
            )))),
            accounts: Arc::new(AccountAdministration::new(Arc::new(
                SqliteAccountRepository::new(db.clone(), timeout),
            ))),
            db,
            config,
        }
    }
}
