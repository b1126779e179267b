// Account administration rules - pure transitions over the account row
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::authority::{Actor, Capability, Role, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult, Transition};
use crate::ids::UserId;

const MAX_UNBLOCK_MESSAGE_LEN: usize = 1000;

/// A live (not soft-deleted) account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn target(&self) -> Target<'_> {
        Target::Account {
            id: &self.id,
            role: self.role,
        }
    }

    /// The identity this account acts with
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id.clone(),
            role: self.role,
            is_blocked: self.is_blocked,
        }
    }

    pub fn set_blocked(self, actor: &Actor, blocked: bool) -> EngineResult<Transition<Self>> {
        let capability = if blocked {
            Capability::Block
        } else {
            Capability::Unblock
        };
        RoleAuthority::require(actor, &self.target(), capability)?;

        if self.is_blocked == blocked {
            return Ok(Transition::Unchanged(self));
        }
        Ok(Transition::Changed(Self {
            is_blocked: blocked,
            ..self
        }))
    }

    pub fn change_role(self, actor: &Actor, role: Role) -> EngineResult<Transition<Self>> {
        RoleAuthority::require(actor, &self.target(), Capability::ChangeRole)?;

        if self.role == role {
            return Ok(Transition::Unchanged(self));
        }
        Ok(Transition::Changed(Self { role, ..self }))
    }

    /// Own profile or someone else's, with the matching capability
    pub fn check_viewer(&self, actor: &Actor) -> EngineResult<()> {
        let capability = if actor.id == self.id {
            Capability::ViewOwnProfile
        } else {
            Capability::View
        };
        RoleAuthority::require(actor, &self.target(), capability)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnblockRequest {
    pub user_id: UserId,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UnblockRequest {
    pub fn new(actor: &Actor, message: Option<String>, now: DateTime<Utc>) -> EngineResult<Self> {
        RoleAuthority::require(actor, &actor.own_account(), Capability::RequestUnblock)?;

        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if let Some(m) = &message {
            if m.chars().count() > MAX_UNBLOCK_MESSAGE_LEN {
                return Err(EngineError::validation(format!(
                    "Message must be {} characters or less",
                    MAX_UNBLOCK_MESSAGE_LEN
                )));
            }
        }

        Ok(Self {
            user_id: actor.id.clone(),
            message,
            created_at: now,
        })
    }
}
