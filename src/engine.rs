// Shared result types for every lifecycle manager
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;

/// Outcome of every engine operation. Expected business conditions are
/// variants here, never panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Actor is not allowed to perform this action")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already deleted")]
    AlreadyDeleted,

    #[error("Not deleted")]
    NotDeleted,

    #[error("Already registered for this event")]
    AlreadyRegistered,

    #[error("Already applied to this job")]
    AlreadyApplied,

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("Event has reached its participant limit")]
    CapacityExceeded,

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store unavailable: {0}")]
    Transient(String),
}

/// Coarse taxonomy callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Transient,
}

impl EngineError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Forbidden => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyDeleted
            | Self::NotDeleted
            | Self::AlreadyRegistered
            | Self::AlreadyApplied
            | Self::RegistrationClosed
            | Self::CapacityExceeded
            | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Only store failures may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Stable machine-readable code for the UI to localize
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::AlreadyDeleted => "already_deleted",
            Self::NotDeleted => "not_deleted",
            Self::AlreadyRegistered => "already_registered",
            Self::AlreadyApplied => "already_applied",
            Self::RegistrationClosed => "registration_closed",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Validation(_) => "validation_error",
            Self::Transient(_) => "transient",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::Transient(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of applying a transition to a state that may already hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Changed(S),
    Unchanged(S),
}

impl<S> Transition<S> {
    pub fn state(self) -> S {
        match self {
            Self::Changed(s) | Self::Unchanged(s) => s,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}
