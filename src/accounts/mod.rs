pub mod domain;
pub mod repository;

pub use domain::{Account, UnblockRequest};
pub use repository::{AccountRepository, DynAccountRepository, SqliteAccountRepository};

use chrono::{DateTime, Utc};

use crate::authority::{Actor, Role, RoleAuthority};
use crate::engine::{EngineError, EngineResult, Transition};

const REQUEST_LIMIT: u32 = 200;

/// Blocking, role changes and unblock requests
pub struct AccountAdministration {
    repo: DynAccountRepository,
}

impl AccountAdministration {
    pub fn new(repo: DynAccountRepository) -> Self {
        Self { repo }
    }

    async fn load(&self, user_id: &str) -> EngineResult<Account> {
        self.repo
            .load(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("account {}", user_id)))
    }

    pub async fn block(&self, actor: &Actor, user_id: &str) -> EngineResult<Account> {
        self.set_blocked(actor, user_id, true).await
    }

    pub async fn unblock(&self, actor: &Actor, user_id: &str) -> EngineResult<Account> {
        self.set_blocked(actor, user_id, false).await
    }

    async fn set_blocked(&self, actor: &Actor, user_id: &str, blocked: bool) -> EngineResult<Account> {
        for _ in 0..2 {
            let account = self.load(user_id).await?;
            match account.set_blocked(actor, blocked)? {
                Transition::Unchanged(account) => return Ok(account),
                Transition::Changed(account) => {
                    if self.repo.set_blocked(user_id, blocked).await? {
                        tracing::info!(user_id, blocked, actor = %actor.id, "Account block changed");
                        return Ok(account);
                    }
                }
            }
        }

        Err(EngineError::Transient(format!(
            "account {} changed concurrently",
            user_id
        )))
    }

    pub async fn change_role(&self, actor: &Actor, user_id: &str, role: Role) -> EngineResult<Account> {
        for _ in 0..2 {
            let account = self.load(user_id).await?;
            let expected = account.role;
            match account.change_role(actor, role)? {
                Transition::Unchanged(account) => return Ok(account),
                Transition::Changed(account) => {
                    if self.repo.set_role(user_id, role, expected).await? {
                        tracing::info!(
                            user_id,
                            from = %expected,
                            to = %role,
                            actor = %actor.id,
                            "Account role changed"
                        );
                        return Ok(account);
                    }
                }
            }
        }

        Err(EngineError::Transient(format!(
            "account {} changed concurrently",
            user_id
        )))
    }

    pub async fn request_unblock(
        &self,
        actor: &Actor,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<UnblockRequest> {
        let request = UnblockRequest::new(actor, message, now)?;
        self.repo.upsert_unblock_request(&request).await?;

        tracing::info!(user_id = %actor.id, "Unblock requested");
        Ok(request)
    }

    /// Open requests for the moderation console
    pub async fn unblock_requests(&self, actor: &Actor) -> EngineResult<Vec<UnblockRequest>> {
        RoleAuthority::require_staff(actor)?;
        Ok(self.repo.unblock_requests(REQUEST_LIMIT).await?)
    }

    pub async fn profile(&self, actor: &Actor, user_id: &str) -> EngineResult<Account> {
        let account = self.load(user_id).await?;
        account.check_viewer(actor)?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_admin() -> (AccountAdministration, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO users (id, username, role) VALUES
                     ('root', 'root', 'admin'),
                     ('other', 'other', 'admin'),
                     ('mo', 'mo', 'moderator'),
                     ('bob', 'bob', 'user');",
            )
            .unwrap();
        let repo = Arc::new(SqliteAccountRepository::new(pool, Duration::from_secs(5)));
        (AccountAdministration::new(repo), temp_dir)
    }

    #[tokio::test]
    async fn block_request_unblock_cycle() {
        let (admin, _temp) = create_test_admin();
        let mo = Actor::new("mo", Role::Moderator);

        let bob = admin.block(&mo, "bob").await.unwrap();
        assert!(bob.is_blocked);
        assert!(admin.block(&mo, "bob").await.unwrap().is_blocked);

        let blocked_bob = bob.actor();
        admin
            .request_unblock(&blocked_bob, Some("It was a mistake".into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(admin.unblock_requests(&mo).await.unwrap().len(), 1);
        assert_eq!(
            admin.unblock_requests(&blocked_bob).await.unwrap_err(),
            EngineError::Forbidden
        );

        assert!(!admin.unblock(&mo, "bob").await.unwrap().is_blocked);
        assert!(admin.unblock_requests(&mo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_cannot_touch_another_admin() {
        let (admin, _temp) = create_test_admin();
        let root = Actor::new("root", Role::Admin);

        assert_eq!(admin.block(&root, "other").await.unwrap_err(), EngineError::Forbidden);
        assert_eq!(
            admin.change_role(&root, "other", Role::User).await.unwrap_err(),
            EngineError::Forbidden
        );

        let promoted = admin.change_role(&root, "bob", Role::Moderator).await.unwrap();
        assert_eq!(promoted.role, Role::Moderator);
    }

    #[tokio::test]
    async fn profiles_respect_blocking() {
        let (admin, _temp) = create_test_admin();
        let bob = Actor::new("bob", Role::User).blocked();

        assert_eq!(admin.profile(&bob, "bob").await.unwrap().username, "bob");
        assert_eq!(admin.profile(&bob, "mo").await.unwrap_err(), EngineError::Forbidden);
        assert!(matches!(
            admin.profile(&bob, "missing").await.unwrap_err(),
            EngineError::NotFound(_)
        ));
    }
}
