//! Store traits the task processor is written against.
//!
//! Implemented by the sqlx repositories in [`crate::repositories`] and by
//! the in-memory stores in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use drivehub_core::result::AppResult;
use drivehub_entity::connection::CloudConnection;
use drivehub_entity::task::{NewTask, Task, TaskStatus};

/// Durable table of tasks keyed by id.
#[async_trait]
pub trait TaskStore: Send + Sync + std::fmt::Debug + 'static {
    /// Tasks with `status` and an id greater than `after_id`, ascending by
    /// id, at most `limit` of them.
    async fn list_by_status(
        &self,
        status: TaskStatus,
        after_id: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<Task>>;

    /// Find a task by id.
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Task>>;

    /// Persist the mutable state of a task (status, error, timestamps).
    async fn save(&self, task: &Task) -> AppResult<Task>;

    /// Move a task from `PENDING` to `IN_PROGRESS`, stamping `updated_at`
    /// and clearing any previous error.
    ///
    /// Compare-and-set on the stored status: `None` when the row is missing
    /// or no longer `PENDING`, meaning another worker owns it.
    async fn claim(&self, id: i64, now: DateTime<Utc>) -> AppResult<Option<Task>>;

    /// Write the terminal state of a claimed task.
    ///
    /// Only applies while the stored row is `IN_PROGRESS`; `None` otherwise.
    async fn finish(&self, task: &Task) -> AppResult<Option<Task>>;

    /// Insert a new `PENDING` task.
    async fn create(&self, data: &NewTask) -> AppResult<Task>;

    /// Number of tasks currently in `status`.
    async fn count_by_status(&self, status: TaskStatus) -> AppResult<i64>;
}

/// Credential records for cloud accounts.
#[async_trait]
pub trait ConnectionStore: Send + Sync + std::fmt::Debug + 'static {
    /// Find a connection by account id.
    async fn find_by_id(&self, account_id: i64) -> AppResult<Option<CloudConnection>>;

    /// Overwrite the token fields of a connection (last write wins).
    async fn save(&self, connection: &CloudConnection) -> AppResult<CloudConnection>;
}
