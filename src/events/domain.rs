// Event registration state machine - pure transitions, no side effects
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::approval::ApprovalState;
use crate::authority::{Actor, Capability, RoleAuthority, Target};
use crate::dates;
use crate::engine::{EngineError, EngineResult, Transition};
use crate::ids::{PostId, RegistrationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn approve(self) -> EngineResult<Transition<Self>> {
        match self {
            Self::Pending => Ok(Transition::Changed(Self::Approved)),
            Self::Approved => Ok(Transition::Unchanged(self)),
            Self::Rejected => Err(EngineError::InvalidTransition {
                from: "rejected",
                to: "approved",
            }),
        }
    }

    pub fn reject(self) -> EngineResult<Transition<Self>> {
        match self {
            Self::Pending => Ok(Transition::Changed(Self::Rejected)),
            Self::Rejected => Ok(Transition::Unchanged(self)),
            Self::Approved => Err(EngineError::InvalidTransition {
                from: "approved",
                to: "rejected",
            }),
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling facts carried by an event post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventDetails {
    pub event_date: Option<NaiveDate>,
    pub registration_deadline: Option<NaiveDate>,
    /// None means unlimited
    pub max_participants: Option<u32>,
}

/// Event details as submitted by a client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventDraft {
    pub event_date: String,
    #[serde(default)]
    pub registration_deadline: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
}

impl EventDraft {
    pub fn validate(&self) -> EngineResult<EventDetails> {
        let event_date = dates::parse_date(&self.event_date)?;
        let registration_deadline = self
            .registration_deadline
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(dates::parse_date)
            .transpose()?;

        if let Some(deadline) = registration_deadline {
            if deadline > event_date {
                return Err(EngineError::validation(
                    "Registration deadline cannot be after the event date",
                ));
            }
        }
        if self.max_participants == Some(0) {
            return Err(EngineError::validation("Participant limit must be at least 1"));
        }

        Ok(EventDetails {
            event_date: Some(event_date),
            registration_deadline,
            max_participants: self.max_participants,
        })
    }
}

impl EventDetails {
    /// Last day registration is accepted: the deadline, else the event day
    pub fn closing_date(&self) -> Option<NaiveDate> {
        self.registration_deadline.or(self.event_date)
    }

    pub fn check_open(&self, today: NaiveDate) -> EngineResult<()> {
        match self.closing_date() {
            Some(closing) if !dates::is_open_on(today, closing) => {
                Err(EngineError::RegistrationClosed)
            }
            _ => Ok(()),
        }
    }
}

/// An event post as seen by the registration manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: PostId,
    pub owner_id: UserId,
    pub approval: ApprovalState,
    pub details: EventDetails,
}

impl Event {
    pub fn target(&self) -> Target<'_> {
        Target::Event {
            owner: &self.owner_id,
        }
    }

    /// Guard for a new sign-up on `today` (reference-offset calendar date)
    pub fn check_registration(&self, actor: &Actor, today: NaiveDate) -> EngineResult<()> {
        RoleAuthority::require(actor, &self.target(), Capability::Participate)?;
        if !self.approval.is_approved() {
            return Err(EngineError::Forbidden);
        }
        self.details.check_open(today)
    }

    pub fn check_reviewer(&self, actor: &Actor) -> EngineResult<()> {
        RoleAuthority::require(actor, &self.target(), Capability::Review)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRegistration {
    pub id: RegistrationId,
    pub event_id: PostId,
    pub user_id: UserId,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl EventRegistration {
    pub fn new(event_id: PostId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::generate(),
            event_id,
            user_id,
            status: RegistrationStatus::Pending,
            created_at: now,
            reviewed_by: None,
            reviewed_at: None,
        }
    }

    pub fn decide(
        self,
        reviewer: &Actor,
        approve: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Transition<Self>> {
        let transition = if approve {
            self.status.approve()?
        } else {
            self.status.reject()?
        };

        Ok(match transition {
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

/// Registrations of one event with seat accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub event_id: PostId,
    pub max_participants: Option<u32>,
    pub approved: u32,
    pub pending: u32,
    pub registrations: Vec<EventRegistration>,
}

impl Roster {
    pub fn new(event: &Event, registrations: Vec<EventRegistration>) -> Self {
        let count = |status| registrations.iter().filter(|r| r.status == status).count() as u32;
        Self {
            event_id: event.id.clone(),
            max_participants: event.details.max_participants,
            approved: count(RegistrationStatus::Approved),
            pending: count(RegistrationStatus::Pending),
            registrations,
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.max_participants
            .map(|max| max.saturating_sub(self.approved))
    }
}
