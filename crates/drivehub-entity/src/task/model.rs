//! Task entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{OperationKind, TaskStatus};
use crate::connection::CloudProvider;

/// One queued file operation between cloud accounts.
///
/// Rows are created `PENDING` by the enqueuing flow, mutated only by the
/// processing run, and kept afterwards as an audit record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Monotonically assigned identifier.
    pub id: i64,
    /// Requested operation.
    pub operation_kind: OperationKind,
    /// Vendor whose executor performs the operation.
    pub provider: CloudProvider,
    /// Source path or vendor file identifier.
    pub source_path: String,
    /// Destination folder path or identifier (absent for DELETE).
    pub destination_path: Option<String>,
    /// Account the source lives in.
    pub source_account_id: i64,
    /// Account receiving the copy (absent for DELETE).
    pub destination_account_id: Option<i64>,
    /// Source account email.
    pub source_email: Option<String>,
    /// Destination account email, used by share-then-copy providers.
    pub destination_email: Option<String>,
    /// User who requested the task.
    pub user_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Failure reason when `status` is `Failed`.
    pub error_message: Option<String>,
    /// When the task was enqueued.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status change.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Move to `next` if the transition is legal, stamping `updated_at`.
    ///
    /// Returns `false` and leaves the task untouched otherwise.
    pub fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = now;
        true
    }

    /// Destination folder and account for COPY/MOVE.
    pub fn destination(&self) -> Result<(&str, i64), String> {
        let account = self.destination_account_id.ok_or_else(|| {
            format!(
                "{} task {} has no destination account",
                self.operation_kind, self.id
            )
        })?;
        let path = self.destination_path.as_deref().ok_or_else(|| {
            format!(
                "{} task {} has no destination path",
                self.operation_kind, self.id
            )
        })?;
        Ok((path, account))
    }
}

/// Data required to enqueue a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    /// Requested operation.
    pub operation_kind: OperationKind,
    /// Target vendor.
    pub provider: CloudProvider,
    /// Source path or identifier.
    pub source_path: String,
    /// Destination folder (COPY/MOVE).
    pub destination_path: Option<String>,
    /// Source account.
    pub source_account_id: i64,
    /// Destination account (COPY/MOVE).
    pub destination_account_id: Option<i64>,
    /// Source account email.
    pub source_email: Option<String>,
    /// Destination account email.
    pub destination_email: Option<String>,
    /// Requesting user.
    pub user_id: String,
}
