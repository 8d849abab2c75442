//! Task dispatcher owning the task status state machine.
//!
//! `PENDING -> IN_PROGRESS -> {COMPLETED, FAILED}`. A task is claimed in the
//! task store (a conditional `PENDING -> IN_PROGRESS` write) before any
//! provider call; a task that cannot be claimed is never executed. Every
//! executor failure (panics included) ends as `FAILED` with the reason
//! recorded on the task. Nothing escapes to the caller.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use drivehub_database::store::TaskStore;
use drivehub_entity::connection::CloudProvider;
use drivehub_entity::task::{OperationKind, Task, TaskStatus};
use drivehub_storage::executor::{OperationError, OperationExecutor};

/// What happened to a dispatched task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The operation succeeded; the task is `COMPLETED`.
    Completed,
    /// The operation failed; the task is `FAILED` with this reason.
    Failed(OperationError),
    /// The task could not be claimed and was left untouched.
    Skipped,
}

/// Routes tasks to the executor registered for their provider.
#[derive(Debug)]
pub struct TaskDispatcher {
    /// Registered executors by provider
    executors: HashMap<CloudProvider, Arc<dyn OperationExecutor>>,
    /// Store the pickup claim is written to
    store: Arc<dyn TaskStore>,
}

impl TaskDispatcher {
    /// Create a dispatcher with no executors registered.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            executors: HashMap::new(),
            store,
        }
    }

    /// Register an executor for the provider it reports.
    pub fn register(&mut self, executor: Arc<dyn OperationExecutor>) {
        let provider = executor.provider();
        tracing::info!("Registered operation executor for provider '{}'", provider);
        self.executors.insert(provider, executor);
    }

    /// Whether an executor is registered for `provider`.
    pub fn has_executor(&self, provider: CloudProvider) -> bool {
        self.executors.contains_key(&provider)
    }

    /// Run one task through the state machine.
    ///
    /// Returns the task in its final state. Persisting that state is the
    /// caller's job; only the pickup claim is written here.
    pub async fn dispatch(&self, task: Task) -> (Task, TaskOutcome) {
        if task.status != TaskStatus::Pending {
            debug!(task_id = task.id, status = %task.status, "Task is not pending, skipping");
            return (task, TaskOutcome::Skipped);
        }

        let mut task = match self.store.claim(task.id, Utc::now()).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                debug!(task_id = task.id, "Task already claimed, skipping");
                return (task, TaskOutcome::Skipped);
            }
            Err(e) => {
                warn!(task_id = task.id, error = %e, "Failed to claim task, leaving it pending");
                return (task, TaskOutcome::Skipped);
            }
        };

        info!(
            task_id = task.id,
            kind = %task.operation_kind,
            provider = %task.provider,
            "Processing task"
        );

        let result = AssertUnwindSafe(self.execute(&task))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(OperationError::Panicked(panic_message(payload))));

        match result {
            Ok(()) => {
                task.transition(TaskStatus::Completed, Utc::now());
                info!(task_id = task.id, "Task completed");
                (task, TaskOutcome::Completed)
            }
            Err(e) => {
                warn!(
                    task_id = task.id,
                    kind = %task.operation_kind,
                    provider = %task.provider,
                    error = %e,
                    "Task failed"
                );
                task.transition(TaskStatus::Failed, Utc::now());
                task.error_message = Some(e.to_string());
                (task, TaskOutcome::Failed(e))
            }
        }
    }

    async fn execute(&self, task: &Task) -> Result<(), OperationError> {
        if task.operation_kind.needs_destination() {
            task.destination().map_err(OperationError::InvalidTask)?;
        }

        let executor =
            self.executors
                .get(&task.provider)
                .ok_or(OperationError::Unsupported {
                    kind: task.operation_kind,
                    provider: task.provider,
                })?;

        match task.operation_kind {
            OperationKind::Copy => executor.copy(task).await,
            OperationKind::Move => {
                executor.copy(task).await?;
                debug!(task_id = task.id, "Copy succeeded, deleting source");
                executor
                    .delete_by_account(&task.source_path, task.source_account_id)
                    .await
            }
            OperationKind::Delete => {
                executor
                    .delete_by_account(&task.source_path, task.source_account_id)
                    .await
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;

    use drivehub_database::memory::MemoryTaskStore;

    use crate::test_support::{
        CopyBehavior, FlakyTaskStore, RecordingExecutor, pending_task, seeded_store,
    };

    fn dispatcher(
        store: Arc<MemoryTaskStore>,
        executor: Arc<RecordingExecutor>,
    ) -> TaskDispatcher {
        let mut dispatcher = TaskDispatcher::new(store);
        dispatcher.register(executor);
        dispatcher
    }

    #[tokio::test]
    async fn test_copy_checkpoints_in_progress_before_provider_call() {
        let store = seeded_store(1, OperationKind::Copy, CloudProvider::GoogleDrive).await;
        let executor = Arc::new(
            RecordingExecutor::new(CloudProvider::GoogleDrive, CopyBehavior::Succeed)
                .observing(Arc::clone(&store)),
        );
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let created = task.updated_at;
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.updated_at >= created);
        assert_eq!(executor.copies(), 1);
        assert_eq!(executor.deletes(), 0);
        assert_eq!(*executor.observed.lock().await, vec![TaskStatus::InProgress]);
    }

    #[tokio::test]
    async fn test_move_with_failing_copy_never_deletes() {
        let store = seeded_store(1, OperationKind::Move, CloudProvider::Dropbox).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::Dropbox,
            CopyBehavior::Fail,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert!(matches!(
            outcome,
            TaskOutcome::Failed(OperationError::Provider { status: 507, .. })
        ));
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error_message.unwrap().contains("insufficient storage"));
        assert_eq!(executor.copies(), 1);
        assert_eq!(executor.deletes(), 0);
    }

    #[tokio::test]
    async fn test_move_with_panicking_copy_fails_without_delete() {
        let store = seeded_store(1, OperationKind::Move, CloudProvider::OneDrive).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::OneDrive,
            CopyBehavior::Panic,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let (task, outcome) = dispatcher.dispatch(task).await;

        match outcome {
            TaskOutcome::Failed(OperationError::Panicked(message)) => {
                assert!(message.contains("copy blew up for task 1"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(executor.deletes(), 0);
    }

    #[tokio::test]
    async fn test_move_success_copies_then_deletes() {
        let store = seeded_store(1, OperationKind::Move, CloudProvider::Dropbox).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::Dropbox,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!((executor.copies(), executor.deletes()), (1, 1));
    }

    #[tokio::test]
    async fn test_delete_never_calls_copy() {
        let store = seeded_store(1, OperationKind::Delete, CloudProvider::Dropbox).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::Dropbox,
            CopyBehavior::Fail,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(executor.copies(), 0);
        assert_eq!(executor.deletes(), 1);
    }

    #[tokio::test]
    async fn test_copy_without_destination_is_invalid() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = pending_task(1, OperationKind::Copy, CloudProvider::GoogleDrive);
        task.destination_account_id = None;
        store.insert(task.clone()).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::GoogleDrive,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let (task, outcome) = dispatcher.dispatch(task).await;

        assert!(matches!(
            outcome,
            TaskOutcome::Failed(OperationError::InvalidTask(_))
        ));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(executor.copies(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_unsupported() {
        let store = seeded_store(1, OperationKind::Delete, CloudProvider::OneDrive).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::GoogleDrive,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), executor);
        assert!(!dispatcher.has_executor(CloudProvider::OneDrive));

        let task = store.find_by_id(1).await.unwrap().unwrap();
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(OperationError::Unsupported {
                kind: OperationKind::Delete,
                provider: CloudProvider::OneDrive,
            })
        );
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_non_pending_task_is_skipped_unchanged() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = pending_task(1, OperationKind::Copy, CloudProvider::Dropbox);
        task.status = TaskStatus::Completed;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::Dropbox,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(store, Arc::clone(&executor));

        let before = task.updated_at;
        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Skipped);
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.updated_at, before);
        assert_eq!(executor.copies(), 0);
    }

    #[tokio::test]
    async fn test_failed_claim_never_calls_provider() {
        let store = Arc::new(FlakyTaskStore::default());
        let task = pending_task(1, OperationKind::Move, CloudProvider::GoogleDrive);
        store.inner.insert(task.clone()).await;
        store.fail_writes.store(true, Ordering::SeqCst);
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::GoogleDrive,
            CopyBehavior::Succeed,
        ));
        let mut dispatcher = TaskDispatcher::new(store.clone());
        dispatcher.register(executor.clone());

        let (task, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Skipped);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!((executor.copies(), executor.deletes()), (0, 0));
        let stored = store.inner.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_stale_pending_snapshot_is_skipped_once_claimed() {
        let store = seeded_store(1, OperationKind::Move, CloudProvider::Dropbox).await;
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::Dropbox,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&executor));

        let snapshot = store.find_by_id(1).await.unwrap().unwrap();
        let (_, first) = dispatcher.dispatch(snapshot.clone()).await;
        let (task, second) = dispatcher.dispatch(snapshot).await;

        assert_eq!(first, TaskOutcome::Completed);
        assert_eq!(second, TaskOutcome::Skipped);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!((executor.copies(), executor.deletes()), (1, 1));
    }

    #[tokio::test]
    async fn test_task_missing_from_store_is_skipped() {
        let store = Arc::new(MemoryTaskStore::new());
        let executor = Arc::new(RecordingExecutor::new(
            CloudProvider::GoogleDrive,
            CopyBehavior::Succeed,
        ));
        let dispatcher = dispatcher(store, Arc::clone(&executor));

        let task = pending_task(9, OperationKind::Copy, CloudProvider::GoogleDrive);
        let (_, outcome) = dispatcher.dispatch(task).await;

        assert_eq!(outcome, TaskOutcome::Skipped);
        assert_eq!(executor.copies(), 0);
    }
}
