pub mod domain;
pub mod repository;

pub use domain::{ContentKind, DeletionMark, LifecycleState, ModeratedEntity};
pub use repository::{ContentRepository, DynContentRepository, SqliteContentRepository};

use chrono::{DateTime, Utc};

use crate::authority::Actor;
use crate::engine::{EngineError, EngineResult};

/// Soft-delete / restore / hard-delete for posts, comments and accounts
pub struct ContentLifecycle {
    repo: DynContentRepository,
}

impl ContentLifecycle {
    pub fn new(repo: DynContentRepository) -> Self {
        Self { repo }
    }

    async fn load(&self, kind: ContentKind, id: &str) -> EngineResult<ModeratedEntity> {
        self.repo
            .load(kind, id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("{} {}", kind, id)))
    }

    pub async fn soft_delete(
        &self,
        actor: &Actor,
        kind: ContentKind,
        id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<ModeratedEntity> {
        let current = self.load(kind, id).await?;
        let deleted = current.soft_delete(actor, reason, now)?;

        if let Some(mark) = &deleted.deletion {
            // Lost a race with another delete
            if !self.repo.mark_deleted(kind, id, mark).await? {
                return Err(EngineError::AlreadyDeleted);
            }
        }

        tracing::info!(kind = %kind, id, actor = %actor.id, "Soft-deleted");
        Ok(deleted)
    }

    pub async fn restore(
        &self,
        actor: &Actor,
        kind: ContentKind,
        id: &str,
    ) -> EngineResult<ModeratedEntity> {
        let current = self.load(kind, id).await?;
        let restored = current.restore(actor)?;

        if !self.repo.clear_deletion(kind, id).await? {
            return Err(EngineError::NotDeleted);
        }

        tracing::info!(kind = %kind, id, actor = %actor.id, "Restored");
        Ok(restored)
    }

    pub async fn hard_delete(&self, actor: &Actor, kind: ContentKind, id: &str) -> EngineResult<()> {
        let current = self.load(kind, id).await?;
        current.check_hard_delete(actor)?;

        if !self.repo.purge(kind, id).await? {
            return Err(EngineError::NotDeleted);
        }

        tracing::info!(kind = %kind, id, actor = %actor.id, "Hard-deleted");
        Ok(())
    }

    /// Entity with its deletion state, for capability queries
    pub async fn inspect(&self, kind: ContentKind, id: &str) -> EngineResult<ModeratedEntity> {
        self.load(kind, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Role;
    use crate::db::StoreError;
    use crate::ids::UserId;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// In-memory repository mirroring the SQL conditional writes
    #[derive(Default)]
    struct MemoryRepo {
        entities: Mutex<HashMap<(ContentKind, String), ModeratedEntity>>,
    }

    impl MemoryRepo {
        fn with(entities: Vec<ModeratedEntity>) -> Arc<Self> {
            let repo = Self::default();
            for e in entities {
                repo.entities
                    .lock()
                    .unwrap()
                    .insert((e.kind, e.id.clone()), e);
            }
            Arc::new(repo)
        }
    }

    #[async_trait]
    impl ContentRepository for MemoryRepo {
        async fn load(
            &self,
            kind: ContentKind,
            id: &str,
        ) -> Result<Option<ModeratedEntity>, StoreError> {
            Ok(self.entities.lock().unwrap().get(&(kind, id.to_string())).cloned())
        }

        async fn mark_deleted(
            &self,
            kind: ContentKind,
            id: &str,
            mark: &DeletionMark,
        ) -> Result<bool, StoreError> {
            let mut map = self.entities.lock().unwrap();
            match map.get_mut(&(kind, id.to_string())) {
                Some(e) if e.deletion.is_none() => {
                    e.deletion = Some(mark.clone());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn clear_deletion(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
            let mut map = self.entities.lock().unwrap();
            match map.get_mut(&(kind, id.to_string())) {
                Some(e) if e.deletion.is_some() => {
                    e.deletion = None;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn purge(&self, kind: ContentKind, id: &str) -> Result<bool, StoreError> {
            let mut map = self.entities.lock().unwrap();
            let key = (kind, id.to_string());
            match map.get(&key) {
                Some(e) if e.deletion.is_some() => {
                    map.remove(&key);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    fn post(id: &str, owner: &str) -> ModeratedEntity {
        ModeratedEntity {
            kind: ContentKind::Post,
            id: id.into(),
            owner_id: UserId::new(owner),
            owner_role: Role::User,
            deletion: None,
        }
    }

    #[tokio::test]
    async fn soft_delete_twice_reports_already_deleted() {
        let repo = MemoryRepo::with(vec![post("p1", "alice")]);
        let lifecycle = ContentLifecycle::new(repo);
        let alice = Actor::new("alice", Role::User);

        lifecycle
            .soft_delete(&alice, ContentKind::Post, "p1", None, Utc::now())
            .await
            .unwrap();
        let second = lifecycle
            .soft_delete(&alice, ContentKind::Post, "p1", None, Utc::now())
            .await;
        assert_eq!(second.unwrap_err(), EngineError::AlreadyDeleted);
    }

    #[tokio::test]
    async fn restore_round_trip() {
        let repo = MemoryRepo::with(vec![post("p1", "alice")]);
        let lifecycle = ContentLifecycle::new(repo.clone());
        let root = Actor::new("root", Role::Admin);

        assert_eq!(
            lifecycle
                .restore(&root, ContentKind::Post, "p1")
                .await
                .unwrap_err(),
            EngineError::NotDeleted
        );

        lifecycle
            .soft_delete(&root, ContentKind::Post, "p1", Some("off-topic".into()), Utc::now())
            .await
            .unwrap();
        let restored = lifecycle.restore(&root, ContentKind::Post, "p1").await.unwrap();
        assert_eq!(restored.state(), LifecycleState::Active);
        assert!(repo.load(ContentKind::Post, "p1").await.unwrap().unwrap().deletion.is_none());
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let lifecycle = ContentLifecycle::new(MemoryRepo::with(vec![]));
        let root = Actor::new("root", Role::Admin);
        let err = lifecycle
            .soft_delete(&root, ContentKind::Comment, "nope", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
