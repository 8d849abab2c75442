//! In-memory task and connection stores.
//!
//! Same ordering and overwrite semantics as the PostgreSQL repositories;
//! used for embedded runs and throughout the test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_entity::connection::CloudConnection;
use drivehub_entity::task::{NewTask, Task, TaskStatus};

use crate::store::{ConnectionStore, TaskStore};

/// Task store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<BTreeMap<i64, Task>>,
    last_id: AtomicI64,
}

impl MemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed task, keeping its id.
    pub async fn insert(&self, task: Task) {
        self.last_id.fetch_max(task.id, Ordering::SeqCst);
        self.tasks.write().await.insert(task.id, task);
    }

    /// Snapshot of every task in id order.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list_by_status(
        &self,
        status: TaskStatus,
        after_id: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let lower = after_id.map_or(i64::MIN, |id| id.saturating_add(1));
        Ok(tasks
            .range(lower..)
            .map(|(_, task)| task)
            .filter(|task| task.status == status)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn save(&self, task: &Task) -> AppResult<Task> {
        let mut tasks = self.tasks.write().await;
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| AppError::not_found(format!("Task {} not found", task.id)))?;
        stored.status = task.status;
        stored.error_message = task.error_message.clone();
        stored.updated_at = task.updated_at;
        Ok(stored.clone())
    }

    async fn claim(&self, id: i64, now: DateTime<Utc>) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .get_mut(&id)
            .filter(|stored| stored.status == TaskStatus::Pending)
            .map(|stored| {
                stored.status = TaskStatus::InProgress;
                stored.error_message = None;
                stored.updated_at = now;
                stored.clone()
            }))
    }

    async fn finish(&self, task: &Task) -> AppResult<Option<Task>> {
        let mut tasks = self.tasks.write().await;
        Ok(tasks
            .get_mut(&task.id)
            .filter(|stored| stored.status == TaskStatus::InProgress)
            .map(|stored| {
                stored.status = task.status;
                stored.error_message = task.error_message.clone();
                stored.updated_at = task.updated_at;
                stored.clone()
            }))
    }

    async fn create(&self, data: &NewTask) -> AppResult<Task> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let task = Task {
            id,
            operation_kind: data.operation_kind,
            provider: data.provider,
            source_path: data.source_path.clone(),
            destination_path: data.destination_path.clone(),
            source_account_id: data.source_account_id,
            destination_account_id: data.destination_account_id,
            source_email: data.source_email.clone(),
            destination_email: data.destination_email.clone(),
            user_id: data.user_id.clone(),
            status: TaskStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().await.insert(id, task.clone());
        Ok(task)
    }

    async fn count_by_status(&self, status: TaskStatus) -> AppResult<i64> {
        let tasks = self.tasks.read().await;
        Ok(tasks.values().filter(|t| t.status == status).count() as i64)
    }
}

/// Connection store backed by a map keyed by account id.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<BTreeMap<i64, CloudConnection>>,
}

impl MemoryConnectionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a connection.
    pub async fn insert(&self, connection: CloudConnection) {
        self.connections
            .write()
            .await
            .insert(connection.id, connection);
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn find_by_id(&self, account_id: i64) -> AppResult<Option<CloudConnection>> {
        Ok(self.connections.read().await.get(&account_id).cloned())
    }

    async fn save(&self, connection: &CloudConnection) -> AppResult<CloudConnection> {
        let mut connections = self.connections.write().await;
        let stored = connections.get_mut(&connection.id).ok_or_else(|| {
            AppError::not_found(format!("Connection {} not found", connection.id))
        })?;
        stored.access_token = connection.access_token.clone();
        stored.refresh_token = connection.refresh_token.clone();
        stored.expires_at = connection.expires_at;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivehub_entity::connection::CloudProvider;
    use drivehub_entity::task::OperationKind;

    fn new_task(n: usize) -> NewTask {
        NewTask {
            operation_kind: OperationKind::Delete,
            provider: CloudProvider::Dropbox,
            source_path: format!("/file-{n}.txt"),
            destination_path: None,
            source_account_id: 1,
            destination_account_id: None,
            source_email: None,
            destination_email: None,
            user_id: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryTaskStore::new();
        let a = store.create(&new_task(1)).await.unwrap();
        let b = store.create(&new_task(2)).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_list_by_status_is_keyset_ordered() {
        let store = MemoryTaskStore::new();
        for n in 0..5 {
            store.create(&new_task(n)).await.unwrap();
        }
        let mut second = store.find_by_id(2).await.unwrap().unwrap();
        second.status = TaskStatus::InProgress;
        store.save(&second).await.unwrap();

        let first_page = store
            .list_by_status(TaskStatus::Pending, None, 2)
            .await
            .unwrap();
        let ids: Vec<i64> = first_page.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let next_page = store
            .list_by_status(TaskStatus::Pending, Some(3), 2)
            .await
            .unwrap();
        let ids: Vec<i64> = next_page.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_save_unknown_task_is_not_found() {
        let store = MemoryTaskStore::new();
        let mut task = store.create(&new_task(1)).await.unwrap();
        task.id = 99;
        assert!(store.save(&task).await.is_err());
    }

    #[tokio::test]
    async fn test_claim_only_succeeds_once() {
        let store = MemoryTaskStore::new();
        let task = store.create(&new_task(1)).await.unwrap();
        let now = Utc::now();

        let claimed = store.claim(task.id, now).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert_eq!(claimed.updated_at, now);

        assert!(store.claim(task.id, Utc::now()).await.unwrap().is_none());
        assert!(store.claim(99, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_requires_in_progress_row() {
        let store = MemoryTaskStore::new();
        let mut task = store.create(&new_task(1)).await.unwrap();
        task.status = TaskStatus::Completed;

        // Never claimed, so the row is still PENDING.
        assert!(store.finish(&task).await.unwrap().is_none());
        assert_eq!(
            store.find_by_id(task.id).await.unwrap().unwrap().status,
            TaskStatus::Pending
        );

        store.claim(task.id, Utc::now()).await.unwrap().unwrap();
        let finished = store.finish(&task).await.unwrap().unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);

        // A second terminal write cannot overwrite the first.
        task.status = TaskStatus::Failed;
        assert!(store.finish(&task).await.unwrap().is_none());
        assert_eq!(
            store.find_by_id(task.id).await.unwrap().unwrap().status,
            TaskStatus::Completed
        );
    }
}
