//! Error types for the planning core.
//!
//! Every operation returns one of these as a typed result. The CLI turns them
//! into the `{"status":"error"}` envelope; nothing here is meant to panic.

use thiserror::Error;

use crate::task::TaskId;

/// Calendar math rejected its input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("duration must be at least one day, got {days}")]
    NonPositiveDuration { days: i64 },

    #[error("{days} days from {start} is outside the supported date range")]
    OutOfRange { start: chrono::NaiveDate, days: i64 },
}

/// Caller input that can never be applied, regardless of stored state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected a map of task id to hash, got {shape}")]
    NotAnObject { shape: String },

    #[error("payload is not valid JSON: {reason}")]
    MalformedJson { reason: String },

    #[error("invalid task id in payload: {key:?}")]
    InvalidTaskId { key: String },

    #[error("hash for task {key} must be a string, got {shape}")]
    InvalidHash { key: String, shape: String },

    #[error("duration is not a number: {value:?}")]
    NonNumericDuration { value: String },

    #[error("duration must be positive, got {value}")]
    NonPositiveDuration { value: String },

    #[error("duration must be a multiple of 0.25 days, got {value}")]
    NotQuarterDay { value: String },

    #[error("completion must be an integer between 0 and 100, got {value:?}")]
    CompletionOutOfRange { value: String },

    #[error("invalid priority: {value:?}")]
    InvalidPriority { value: String },

    #[error("invalid timestamp: {value:?}")]
    InvalidTimestamp { value: String },

    #[error("invalid flag, expected true or false: {value:?}")]
    InvalidFlag { value: String },

    #[error("unknown field: {field:?}")]
    UnknownField { field: String },

    #[error("task name cannot be empty")]
    EmptyName,

    #[error("parent task {id} does not exist")]
    UnknownParent { id: TaskId },

    #[error("resource {id} does not exist")]
    UnknownResource { id: u64 },

    #[error("resource {resource} differs from the resource of parent task {parent}")]
    ResourceMismatch { parent: TaskId, resource: u64 },

    #[error("task {id} has subtasks and cannot be the active task")]
    CompositeActivation { id: TaskId },
}

/// The backing store could not be read or written.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("could not acquire lock on {path} after {attempts} attempts")]
    Locked { path: String, attempts: u32 },
}

/// Top-level error for every planner operation.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("task {id} was changed elsewhere")]
    Conflict { id: TaskId },

    #[error("task {id} not found")]
    NotFound { id: TaskId },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PlanError {
    /// Message safe to hand to an untrusted caller.
    ///
    /// Storage failures are collapsed into a generic text; the detail belongs
    /// in the log, not in the response.
    pub fn public_message(&self) -> String {
        match self {
            PlanError::Conflict { .. } => {
                "This record was changed elsewhere. Reload and apply your change again.".to_string()
            }
            PlanError::Storage(_) => "Storage unavailable.".to_string(),
            other => other.to_string(),
        }
    }

    /// Short machine-readable kind, used in the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::Conflict { .. } => "conflict",
            PlanError::NotFound { .. } => "not-found",
            PlanError::Validation(_) => "validation",
            PlanError::Calendar(_) => "calendar",
            PlanError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_do_not_leak_detail() {
        let err = PlanError::from(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/secret/plan.json",
        )));
        assert_eq!(err.public_message(), "Storage unavailable.");
        assert_eq!(err.kind(), "storage");
    }

    #[test]
    fn conflict_message_mentions_other_editor() {
        let err = PlanError::Conflict { id: 7 };
        assert!(err.public_message().contains("changed elsewhere"));
        assert_eq!(err.to_string(), "task 7 was changed elsewhere");
    }

    #[test]
    fn validation_passes_through() {
        let err: PlanError = ValidationError::EmptyName.into();
        assert_eq!(err.public_message(), "task name cannot be empty");
        assert_eq!(err.kind(), "validation");
    }
}
