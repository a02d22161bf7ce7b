use chrono::NaiveTime;
use thiserror::Error;

use crate::model::*;

/// Malformed input or a reference to something the catalog does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("start time {start} must be before end time {end}")]
    EmptyInterval { start: NaiveTime, end: NaiveTime },
    #[error("the class-subject combination ({class_id}, {subject_id}) does not exist")]
    UnknownClassSubject {
        class_id: ClassId,
        subject_id: SubjectId,
    },
    #[error("class {0} does not exist")]
    UnknownClass(ClassId),
    #[error("subject {0} does not exist")]
    UnknownSubject(SubjectId),
    #[error("teacher {0} does not exist")]
    UnknownTeacher(TeacherId),
    #[error("{0} {1} already exists")]
    AlreadyExists(&'static str, String),
    #[error("name too long")]
    NameTooLong,
    #[error("room label too long")]
    RoomTooLong,
    #[error("day of week must be 0-6, got {0}")]
    InvalidDay(i64),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

/// A real double-booking on one dimension. Retrying with the same input
/// reproduces it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{dimension} {resource} is already booked {existing_slot} (entry {existing})")]
pub struct Conflict {
    pub dimension: Dimension,
    /// Teacher id, class id or room label, depending on `dimension`.
    pub resource: String,
    pub existing: EntryId,
    pub existing_slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Storage,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("scheduling conflict: {0}")]
    Conflict(#[from] Conflict),
    /// Persistence failed; nothing was applied. Safe to retry.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// HTTP-equivalent status for a request layer.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::Storage => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }

    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            EngineError::Conflict(c) => Some(c),
            _ => None,
        }
    }
}
