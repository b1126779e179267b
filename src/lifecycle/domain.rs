// Soft-delete state machine - pure transitions, no side effects
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::authority::{Actor, Capability, Role, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult};
use crate::ids::UserId;

const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Comment,
    Account,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Account => "account",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "post" => Some(Self::Post),
            "comment" => Some(Self::Comment),
            "account" => Some(Self::Account),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionMark {
    pub deleted_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub deleted_by: UserId,
}

/// A post, comment or account as seen by the lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeratedEntity {
    pub kind: ContentKind,
    pub id: String,
    pub owner_id: UserId,
    /// Role of the owning account; matters for account targets only
    pub owner_role: Role,
    pub deletion: Option<DeletionMark>,
}

impl ModeratedEntity {
    pub fn target(&self) -> Target<'_> {
        match self.kind {
            ContentKind::Post => Target::Post {
                owner: &self.owner_id,
            },
            ContentKind::Comment => Target::Comment {
                owner: &self.owner_id,
            },
            ContentKind::Account => Target::Account {
                id: &self.owner_id,
                role: self.owner_role,
            },
        }
    }

    pub fn state(&self) -> LifecycleState {
        if self.deletion.is_some() {
            LifecycleState::Deleted
        } else {
            LifecycleState::Active
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    /// Transition: Active → Deleted
    pub fn soft_delete(
        self,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        RoleAuthority::require(actor, &self.target(), Capability::Delete)?;

        if self.is_deleted() {
            return Err(EngineError::AlreadyDeleted);
        }

        let reason = normalize_reason(reason)?;

        Ok(Self {
            deletion: Some(DeletionMark {
                deleted_at: now,
                reason,
                deleted_by: actor.id.clone(),
            }),
            ..self
        })
    }

    /// Transition: Deleted → Active (admins only, never comments)
    pub fn restore(self, actor: &Actor) -> EngineResult<Self> {
        if actor.role != Role::Admin {
            return Err(EngineError::Forbidden);
        }
        RoleAuthority::require(actor, &self.target(), Capability::Restore)?;

        if !self.is_deleted() {
            return Err(EngineError::NotDeleted);
        }

        Ok(Self {
            deletion: None,
            ..self
        })
    }

    /// Guard for Deleted → gone. Only soft-deleted accounts are purgeable.
    pub fn check_hard_delete(&self, actor: &Actor) -> EngineResult<()> {
        if actor.role != Role::Admin || self.kind != ContentKind::Account {
            return Err(EngineError::Forbidden);
        }
        RoleAuthority::require(actor, &self.target(), Capability::HardDelete)?;

        if !self.is_deleted() {
            return Err(EngineError::NotDeleted);
        }
        Ok(())
    }
}

fn normalize_reason(reason: Option<String>) -> EngineResult<Option<String>> {
    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    if let Some(r) = &reason {
        if r.chars().count() > MAX_REASON_LEN {
            return Err(EngineError::validation(format!(
                "Deletion reason must be {} characters or less",
                MAX_REASON_LEN
            )));
        }
    }
    Ok(reason)
}
