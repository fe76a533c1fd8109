use thiserror::Error;

use crate::store::StoreError;
use crate::types::Weekday;

/// Errors raised by the scheduling core. Every variant is terminal for the
/// attempted operation; callers surface it and keep their prior state.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A required field is missing or malformed. The operation was not attempted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Deleting an entity that other records still point at.
    #[error("Cannot delete {entity} {id}: still referenced by {references} record(s)")]
    ReferentialConflict {
        entity: &'static str,
        id: String,
        references: usize,
    },

    /// Two slots of one timetable share the same weekday and start time.
    #[error("Slot collision on {day} at {start}: already taken by {subject}")]
    SlotCollision {
        day: Weekday,
        start: String,
        subject: String,
    },

    /// The timetable form still has a slot open for editing.
    #[error("Slot {slot_id} is still being edited; save or remove it first")]
    EditInProgress { slot_id: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The authorization port refused the mutation.
    #[error("Permission denied: {reason}")]
    Forbidden { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScheduleError {
    /// Short stable code for operator-facing surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::Validation(_) => "VALIDATION_ERROR",
            ScheduleError::ReferentialConflict { .. } => "REFERENTIAL_CONFLICT",
            ScheduleError::SlotCollision { .. } => "SLOT_COLLISION",
            ScheduleError::EditInProgress { .. } => "EDIT_IN_PROGRESS",
            ScheduleError::NotFound { .. } => "NOT_FOUND",
            ScheduleError::Forbidden { .. } => "FORBIDDEN",
            ScheduleError::Config(_) => "CONFIG_ERROR",
            ScheduleError::Store(_) => "STORE_ERROR",
            ScheduleError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
