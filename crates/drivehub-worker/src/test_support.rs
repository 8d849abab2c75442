//! Instrumented collaborators shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_database::memory::MemoryTaskStore;
use drivehub_database::store::TaskStore;
use drivehub_entity::connection::CloudProvider;
use drivehub_entity::task::{NewTask, OperationKind, Task, TaskStatus};
use drivehub_storage::executor::{OperationError, OperationExecutor};

/// How the instrumented executor's copy behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyBehavior {
    Succeed,
    Fail,
    Panic,
}

/// Executor that counts calls and records the stored status it observes.
#[derive(Debug)]
pub(crate) struct RecordingExecutor {
    provider: CloudProvider,
    copy_behavior: CopyBehavior,
    delay: Duration,
    store: Option<Arc<MemoryTaskStore>>,
    pub(crate) copy_calls: AtomicUsize,
    pub(crate) delete_calls: AtomicUsize,
    pub(crate) observed: Mutex<Vec<TaskStatus>>,
}

impl RecordingExecutor {
    pub(crate) fn new(provider: CloudProvider, copy_behavior: CopyBehavior) -> Self {
        Self {
            provider,
            copy_behavior,
            delay: Duration::ZERO,
            store: None,
            copy_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn observing(mut self, store: Arc<MemoryTaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub(crate) fn copies(&self) -> usize {
        self.copy_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OperationExecutor for RecordingExecutor {
    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn copy(&self, task: &Task) -> Result<(), OperationError> {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = &self.store {
            if let Ok(Some(stored)) = store.find_by_id(task.id).await {
                self.observed.lock().await.push(stored.status);
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.copy_behavior {
            CopyBehavior::Succeed => Ok(()),
            CopyBehavior::Fail => Err(OperationError::Provider {
                provider: self.provider,
                status: 507,
                message: "insufficient storage".to_string(),
            }),
            CopyBehavior::Panic => panic!("copy blew up for task {}", task.id),
        }
    }

    async fn delete_by_account(
        &self,
        _path: &str,
        _account_id: i64,
    ) -> Result<(), OperationError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

/// Task store whose reads or status writes can be switched to fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyTaskStore {
    pub(crate) inner: MemoryTaskStore,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_writes: AtomicBool,
}

impl FlakyTaskStore {
    fn check_write(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::database("could not serialize access"));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for FlakyTaskStore {
    async fn list_by_status(
        &self,
        status: TaskStatus,
        after_id: Option<i64>,
        limit: u32,
    ) -> AppResult<Vec<Task>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::database("connection reset by peer"));
        }
        self.inner.list_by_status(status, after_id, limit).await
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Task>> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, task: &Task) -> AppResult<Task> {
        self.check_write()?;
        self.inner.save(task).await
    }

    async fn claim(&self, id: i64, now: DateTime<Utc>) -> AppResult<Option<Task>> {
        self.check_write()?;
        self.inner.claim(id, now).await
    }

    async fn finish(&self, task: &Task) -> AppResult<Option<Task>> {
        self.check_write()?;
        self.inner.finish(task).await
    }

    async fn create(&self, data: &NewTask) -> AppResult<Task> {
        self.inner.create(data).await
    }

    async fn count_by_status(&self, status: TaskStatus) -> AppResult<i64> {
        self.inner.count_by_status(status).await
    }
}

/// A PENDING task of the given kind, with destination fields for COPY/MOVE.
pub(crate) fn pending_task(id: i64, kind: OperationKind, provider: CloudProvider) -> Task {
    let now = Utc::now();
    let with_destination = kind.needs_destination();
    Task {
        id,
        operation_kind: kind,
        provider,
        source_path: format!("/src/file-{id}.bin"),
        destination_path: with_destination.then(|| "/dest".to_string()),
        source_account_id: 1,
        destination_account_id: with_destination.then_some(2),
        source_email: Some("source@example.com".to_string()),
        destination_email: with_destination.then(|| "dest@example.com".to_string()),
        user_id: "user-1".to_string(),
        status: TaskStatus::Pending,
        error_message: None,
        created_at: now,
        updated_at: now,
    }
}

/// Fill a memory store with `count` PENDING tasks with ids `1..=count`.
pub(crate) async fn seeded_store(
    count: i64,
    kind: OperationKind,
    provider: CloudProvider,
) -> Arc<MemoryTaskStore> {
    let store = Arc::new(MemoryTaskStore::new());
    for id in 1..=count {
        store.insert(pending_task(id, kind, provider)).await;
    }
    store
}
