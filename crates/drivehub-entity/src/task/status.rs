//! Task status and operation kind enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of a task.
///
/// Transitions are monotonic: `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting to be picked up by a processing run.
    Pending,
    /// Picked up; provider calls may be in flight.
    InProgress,
    /// The operation finished successfully.
    Completed,
    /// The operation failed; see the task's error message.
    Failed,
}

impl TaskStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Return the status as its stored string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The file operation a task requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "operation_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Copy the source to the destination account.
    Copy,
    /// Copy, then delete the source once the copy succeeded.
    #[serde(alias = "CUT")]
    Move,
    /// Delete the source.
    Delete,
}

impl OperationKind {
    /// Whether the operation writes to a destination account.
    pub fn needs_destination(&self) -> bool {
        matches!(self, Self::Copy | Self::Move)
    }

    /// Return the kind as its stored string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "COPY",
            Self::Move => "MOVE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(InProgress));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        let legacy: OperationKind = serde_json::from_str("\"CUT\"").unwrap();
        assert_eq!(legacy, OperationKind::Move);
        assert!(!OperationKind::Delete.needs_destination());
    }
}
