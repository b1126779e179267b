// Job application pipeline - pure transitions, no side effects
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::approval::ApprovalState;
use crate::authority::{Actor, Capability, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult, Transition};
use crate::ids::{ApplicationId, JobId, UserId};

const MAX_COVER_LETTER_LEN: usize = 5000;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_LOCATION_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "reviewed" => Some(Self::Reviewed),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer actions on an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    MarkReviewed,
    Accept,
    Reject,
}

impl ReviewAction {
    /// Status only moves forward. Repeating the action that produced the
    /// current status is a no-op, as is marking a decided application reviewed.
    pub fn apply(self, status: ApplicationStatus) -> EngineResult<Transition<ApplicationStatus>> {
        use ApplicationStatus::*;

        match (self, status) {
            (Self::MarkReviewed, Pending) => Ok(Transition::Changed(Reviewed)),
            (Self::MarkReviewed, current) => Ok(Transition::Unchanged(current)),

            (Self::Accept, Pending | Reviewed) => Ok(Transition::Changed(Accepted)),
            (Self::Accept, Accepted) => Ok(Transition::Unchanged(Accepted)),
            (Self::Accept, Rejected) => Err(EngineError::InvalidTransition {
                from: "rejected",
                to: "accepted",
            }),

            (Self::Reject, Pending | Reviewed) => Ok(Transition::Changed(Rejected)),
            (Self::Reject, Rejected) => Ok(Transition::Unchanged(Rejected)),
            (Self::Reject, Accepted) => Err(EngineError::InvalidTransition {
                from: "accepted",
                to: "rejected",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobListing {
    pub id: JobId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub is_active: bool,
    pub approval: ApprovalState,
    pub created_at: DateTime<Utc>,
}

impl JobListing {
    pub fn target(&self) -> Target<'_> {
        Target::JobListing {
            owner: &self.owner_id,
        }
    }

    /// Accepting applications: active, published and the actor may participate
    pub fn check_accepting(&self, actor: &Actor) -> EngineResult<()> {
        RoleAuthority::require(actor, &self.target(), Capability::Participate)?;
        if !self.is_active || !self.approval.is_approved() {
            return Err(EngineError::Forbidden);
        }
        Ok(())
    }

    pub fn check_reviewer(&self, actor: &Actor) -> EngineResult<()> {
        RoleAuthority::require(actor, &self.target(), Capability::Review)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJobListing {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewJobListing {
    /// Listings always start active and waiting for review
    pub fn into_listing(self, owner: &Actor, now: DateTime<Utc>) -> EngineResult<JobListing> {
        let title = required_text("Title", &self.title, MAX_TITLE_LEN)?;
        let description = required_text("Description", &self.description, MAX_DESCRIPTION_LEN)?;
        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if let Some(l) = &location {
            if l.chars().count() > MAX_LOCATION_LEN {
                return Err(EngineError::validation(format!(
                    "Location must be {} characters or less",
                    MAX_LOCATION_LEN
                )));
            }
        }

        Ok(JobListing {
            id: JobId::generate(),
            owner_id: owner.id.clone(),
            title,
            description,
            location,
            is_active: true,
            approval: ApprovalState::Pending,
            created_at: now,
        })
    }
}

fn required_text(field: &str, value: &str, max: usize) -> EngineResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > max {
        return Err(EngineError::validation(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobApplication {
    pub id: ApplicationId,
    pub job_id: JobId,
    pub applicant_id: UserId,
    pub cover_letter: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl JobApplication {
    pub fn new(
        job_id: JobId,
        applicant: &Actor,
        cover_letter: Option<String>,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let cover_letter = cover_letter
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if let Some(c) = &cover_letter {
            if c.chars().count() > MAX_COVER_LETTER_LEN {
                return Err(EngineError::validation(format!(
                    "Cover letter must be {} characters or less",
                    MAX_COVER_LETTER_LEN
                )));
            }
        }

        Ok(Self {
            id: ApplicationId::generate(),
            job_id,
            applicant_id: applicant.id.clone(),
            cover_letter,
            status: ApplicationStatus::Pending,
            applied_at: now,
            reviewed_by: None,
            reviewed_at: None,
        })
    }

    pub fn review(
        self,
        reviewer: &Actor,
        action: ReviewAction,
        now: DateTime<Utc>,
    ) -> EngineResult<Transition<Self>> {
        Ok(match action.apply(self.status)? {
            Transition::Unchanged(_) => Transition::Unchanged(self),
            Transition::Changed(status) => Transition::Changed(Self {
                status,
                reviewed_by: Some(reviewer.id.clone()),
                reviewed_at: Some(now),
                ..self
            }),
        })
    }
}
