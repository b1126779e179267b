pub mod domain;
pub mod repository;

pub use domain::{submit_for_approval, ApprovalState, GatedItem, GatedKind};
pub use repository::{ApprovalRepository, DynApprovalRepository, SqliteApprovalRepository};

use chrono::{DateTime, Utc};

use crate::authority::{Actor, RoleAuthority};
use crate::engine::{EngineError, EngineResult, Transition};

const QUEUE_LIMIT: u32 = 200;

/// Review workflow for event posts and job listings
pub struct ApprovalGate {
    repo: DynApprovalRepository,
}

impl ApprovalGate {
    pub fn new(repo: DynApprovalRepository) -> Self {
        Self { repo }
    }

    /// A gated item in any approval state
    pub async fn item(&self, kind: GatedKind, id: &str) -> EngineResult<GatedItem> {
        self.repo
            .load(kind, id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("{} {}", kind, id)))
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        kind: GatedKind,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<GatedItem> {
        self.decide(actor, kind, id, true, now).await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        kind: GatedKind,
        id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<GatedItem> {
        self.decide(actor, kind, id, false, now).await
    }

    async fn decide(
        &self,
        actor: &Actor,
        kind: GatedKind,
        id: &str,
        approve: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<GatedItem> {
        // A lost compare-and-swap means another reviewer decided first;
        // re-evaluate once against the winner's state.
        for _ in 0..2 {
            let current = self.item(kind, id).await?;
            let expected = current.approval;

            match current.decide(actor, approve, now)? {
                Transition::Unchanged(item) => return Ok(item),
                Transition::Changed(item) => {
                    if self.repo.save_decision(&item, expected).await? {
                        tracing::info!(
                            kind = %kind,
                            id,
                            reviewer = %actor.id,
                            status = %item.approval,
                            "Approval decided"
                        );
                        return Ok(item);
                    }
                }
            }
        }

        Err(EngineError::Transient(format!(
            "{} {} changed concurrently",
            kind, id
        )))
    }

    /// Pending items for the moderation console, oldest first
    pub async fn pending_queue(&self, actor: &Actor, kind: GatedKind) -> EngineResult<Vec<GatedItem>> {
        RoleAuthority::require_staff(actor)?;
        Ok(self.repo.pending(kind, QUEUE_LIMIT).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Role;
    use crate::db;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_gate() -> (ApprovalGate, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "INSERT INTO users (id, username) VALUES ('alice', 'alice');
                 INSERT INTO posts (id, user_id, post_type, title, body, approval_status, created_at)
                     VALUES ('e1', 'alice', 'event', 'CPR refresher', 'saturday', 'pending', '2026-01-01T00:00:00+00:00');",
            )
            .unwrap();

        let repo = Arc::new(SqliteApprovalRepository::new(pool, Duration::from_secs(5)));
        (ApprovalGate::new(repo), temp_dir)
    }

    #[tokio::test]
    async fn moderator_approves_then_reject_is_invalid() {
        let (gate, _temp) = create_test_gate();
        let mo = Actor::new("mo", Role::Moderator);

        let item = gate.approve(&mo, GatedKind::Event, "e1", Utc::now()).await.unwrap();
        assert_eq!(item.approval, ApprovalState::Published);

        let again = gate.approve(&mo, GatedKind::Event, "e1", Utc::now()).await.unwrap();
        assert_eq!(again.approval, ApprovalState::Published);

        let err = gate.reject(&mo, GatedKind::Event, "e1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn owner_cannot_approve_own_event() {
        let (gate, _temp) = create_test_gate();
        let alice = Actor::new("alice", Role::User);
        let err = gate.approve(&alice, GatedKind::Event, "e1", Utc::now()).await.unwrap_err();
        assert_eq!(err, EngineError::Forbidden);
    }

    #[tokio::test]
    async fn queue_is_staff_only() {
        let (gate, _temp) = create_test_gate();
        let alice = Actor::new("alice", Role::User);
        let root = Actor::new("root", Role::Admin);

        assert_eq!(
            gate.pending_queue(&alice, GatedKind::Event).await.unwrap_err(),
            EngineError::Forbidden
        );
        assert_eq!(gate.pending_queue(&root, GatedKind::Event).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let (gate, _temp) = create_test_gate();
        let root = Actor::new("root", Role::Admin);
        let err = gate
            .approve(&root, GatedKind::JobListing, "nope", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
