//! Task repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_entity::task::{NewTask, Task, TaskStatus};

use crate::store::TaskStore;

/// Repository for the `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    /// Create a new task repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn list_by_status(
        &self,
        status: TaskStatus,
        after_id: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<Task>> {
        sqlx::query_as::<_, Task>(
            "SELECT * FROM tasks WHERE status = $1 AND id > $2 ORDER BY id ASC LIMIT $3",
        )
        .bind(status)
        .bind(after_id.unwrap_or(0))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list tasks", e))
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Task>> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find task", e))
    }

    async fn save(&self, task: &Task) -> AppResult<Task> {
        sqlx::query_as::<_, Task>(
            "UPDATE tasks SET status = $2, error_message = $3, updated_at = $4 \
             WHERE id = $1 RETURNING *",
        )
        .bind(task.id)
        .bind(task.status)
        .bind(&task.error_message)
        .bind(task.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to save task", e))?
        .ok_or_else(|| AppError::not_found(format!("Task {} not found", task.id)))
    }

    async fn claim(&self, id: i64, now: DateTime<Utc>) -> AppResult<Option<Task>> {
        sqlx::query_as::<_, Task>(
            "UPDATE tasks SET status = $3, error_message = NULL, updated_at = $2 \
             WHERE id = $1 AND status = $4 RETURNING *",
        )
        .bind(id)
        .bind(now)
        .bind(TaskStatus::InProgress)
        .bind(TaskStatus::Pending)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim task", e))
    }

    async fn finish(&self, task: &Task) -> AppResult<Option<Task>> {
        sqlx::query_as::<_, Task>(
            "UPDATE tasks SET status = $2, error_message = $3, updated_at = $4 \
             WHERE id = $1 AND status = $5 RETURNING *",
        )
        .bind(task.id)
        .bind(task.status)
        .bind(&task.error_message)
        .bind(task.updated_at)
        .bind(TaskStatus::InProgress)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to finish task", e))
    }

    async fn create(&self, data: &NewTask) -> AppResult<Task> {
        sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (operation_kind, provider, source_path, destination_path, \
             source_account_id, destination_account_id, source_email, destination_email, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(data.operation_kind)
        .bind(data.provider)
        .bind(&data.source_path)
        .bind(&data.destination_path)
        .bind(data.source_account_id)
        .bind(data.destination_account_id)
        .bind(&data.source_email)
        .bind(&data.destination_email)
        .bind(&data.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create task", e))
    }

    async fn count_by_status(&self, status: TaskStatus) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count tasks", e))
    }
}
