// Approval gate - pure review transitions for gated content
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::authority::{Actor, Capability, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult, Transition};
use crate::feed::PostType;
use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Published,
    Rejected,
}

impl ApprovalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Published => "published",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "published" => Some(Self::Published),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Only published content appears in public reads
    pub fn is_approved(&self) -> bool {
        *self == Self::Published
    }

    pub fn approve(self) -> EngineResult<Transition<Self>> {
        match self {
            Self::Pending => Ok(Transition::Changed(Self::Published)),
            Self::Published => Ok(Transition::Unchanged(self)),
            Self::Rejected => Err(EngineError::InvalidTransition {
                from: "rejected",
                to: "published",
            }),
        }
    }

    /// Rejection is terminal: there is no resubmission path.
    pub fn reject(self) -> EngineResult<Transition<Self>> {
        match self {
            Self::Pending => Ok(Transition::Changed(Self::Rejected)),
            Self::Rejected => Ok(Transition::Unchanged(self)),
            Self::Published => Err(EngineError::InvalidTransition {
                from: "published",
                to: "rejected",
            }),
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Automatic side effect of creating a post: events wait for review,
/// everything else is published immediately.
pub fn submit_for_approval(post_type: PostType) -> ApprovalState {
    if post_type.requires_approval() {
        ApprovalState::Pending
    } else {
        ApprovalState::Published
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedKind {
    Event,
    JobListing,
}

impl GatedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::JobListing => "job_listing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(Self::Event),
            "job_listing" | "job" => Some(Self::JobListing),
            _ => None,
        }
    }
}

impl fmt::Display for GatedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gated item as seen by reviewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedItem {
    pub kind: GatedKind,
    pub id: String,
    pub owner_id: UserId,
    pub title: Option<String>,
    pub approval: ApprovalState,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GatedItem {
    pub fn target(&self) -> Target<'_> {
        match self.kind {
            GatedKind::Event => Target::Event {
                owner: &self.owner_id,
            },
            GatedKind::JobListing => Target::JobListing {
                owner: &self.owner_id,
            },
        }
    }

    /// Moderators and admins only, and never on their own items
    pub fn check_reviewer(&self, actor: &Actor) -> EngineResult<()> {
        RoleAuthority::require_staff(actor)?;
        if actor.id == self.owner_id {
            return Err(EngineError::Forbidden);
        }
        RoleAuthority::require(actor, &self.target(), Capability::ApproveContent)
    }

    pub fn decide(
        self,
        actor: &Actor,
        approve: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Transition<Self>> {
        self.check_reviewer(actor)?;

        let transition = if approve {
            self.approval.approve()?
        } else {
            self.approval.reject()?
        };

        Ok(match transition {
            Transition::Unchanged(_) => Transition::Unchanged(self),
            Transition::Changed(next) => Transition::Changed(Self {
                approval: next,
                reviewed_by: Some(actor.id.clone()),
                reviewed_at: Some(now),
                ..self
            }),
        })
    }
}
