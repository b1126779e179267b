pub mod domain;
pub mod repository;

pub use domain::{
    Event, EventDetails, EventDraft, EventRegistration, RegistrationStatus, Roster,
};
pub use repository::{
    ApproveOutcome, DynRegistrationRepository, RegistrationRepository,
    SqliteRegistrationRepository,
};

use chrono::{DateTime, FixedOffset, Utc};

use crate::authority::Actor;
use crate::dates;
use crate::db::InsertOutcome;
use crate::engine::{EngineError, EngineResult, Transition};
use crate::ids::UserId;

/// Sign-ups for event posts: intake, capacity, deadlines and review
pub struct EventRegistrationManager {
    repo: DynRegistrationRepository,
    /// "Today" for deadline checks is taken in this offset
    reference_offset: FixedOffset,
}

impl EventRegistrationManager {
    pub fn new(repo: DynRegistrationRepository, reference_offset: FixedOffset) -> Self {
        Self {
            repo,
            reference_offset,
        }
    }

    async fn load_event(&self, event_id: &str) -> EngineResult<Event> {
        self.repo
            .load_event(event_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("event {}", event_id)))
    }

    /// A registration together with its (live) parent event
    async fn load_registration(&self, id: &str) -> EngineResult<(EventRegistration, Event)> {
        let registration = self
            .repo
            .load_registration(id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("registration {}", id)))?;
        let event = self.load_event(registration.event_id.as_str()).await?;
        Ok((registration, event))
    }

    pub async fn register(
        &self,
        actor: &Actor,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<EventRegistration> {
        let event = self.load_event(event_id).await?;
        let today = dates::local_date(now, self.reference_offset);
        event.check_registration(actor, today)?;

        let registration = EventRegistration::new(event.id.clone(), actor.id.clone(), now);
        match self.repo.insert(&registration).await? {
            InsertOutcome::Inserted => {
                tracing::info!(event_id, user = %actor.id, "Registered for event");
                Ok(registration)
            }
            InsertOutcome::Duplicate => Err(EngineError::AlreadyRegistered),
        }
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        registration_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<EventRegistration> {
        // One re-evaluation when another reviewer decided in between
        for _ in 0..2 {
            let (registration, event) = self.load_registration(registration_id).await?;
            event.check_reviewer(actor)?;

            let decided = match registration.decide(actor, true, now)? {
                Transition::Unchanged(current) => return Ok(current),
                Transition::Changed(decided) => decided,
            };

            match self
                .repo
                .approve_within_capacity(&decided.id, &actor.id, now)
                .await?
            {
                ApproveOutcome::Approved => {
                    tracing::info!(
                        registration_id,
                        event_id = %event.id,
                        reviewer = %actor.id,
                        "Registration approved"
                    );
                    return Ok(decided);
                }
                ApproveOutcome::Full => {
                    tracing::info!(registration_id, event_id = %event.id, "Event is full");
                    return Err(EngineError::CapacityExceeded);
                }
                ApproveOutcome::Stale => continue,
            }
        }

        Err(concurrent_change(registration_id))
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        registration_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<EventRegistration> {
        for _ in 0..2 {
            let (registration, event) = self.load_registration(registration_id).await?;
            event.check_reviewer(actor)?;

            let decided = match registration.decide(actor, false, now)? {
                Transition::Unchanged(current) => return Ok(current),
                Transition::Changed(decided) => decided,
            };

            if self.repo.reject_pending(&decided.id, &actor.id, now).await? {
                tracing::info!(registration_id, reviewer = %actor.id, "Registration rejected");
                return Ok(decided);
            }
        }

        Err(concurrent_change(registration_id))
    }

    /// All registrations of an event with seat counts, for its reviewers
    pub async fn roster(&self, actor: &Actor, event_id: &str) -> EngineResult<Roster> {
        let event = self.load_event(event_id).await?;
        event.check_reviewer(actor)?;
        let registrations = self.repo.for_event(event_id).await?;
        Ok(Roster::new(&event, registrations))
    }

    /// The caller's own registration for an event, if any
    pub async fn registration_of(
        &self,
        user_id: &UserId,
        event_id: &str,
    ) -> EngineResult<Option<EventRegistration>> {
        let registrations = self.repo.for_event(event_id).await?;
        Ok(registrations.into_iter().find(|r| &r.user_id == user_id))
    }
}

fn concurrent_change(id: &str) -> EngineError {
    EngineError::Transient(format!("registration {} changed concurrently", id))
}
