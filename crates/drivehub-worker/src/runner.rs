//! Run coordinator that drains the pending backlog page by page.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;
use drivehub_database::store::TaskStore;
use drivehub_entity::task::{Task, TaskStatus};
use drivehub_storage::executor::OperationError;

use crate::dispatcher::{TaskDispatcher, TaskOutcome};
use crate::pool::{Job, PoolError, WorkerPool};
use crate::reader::ChunkedReader;

/// Totals for one processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Correlation id attached to every log line of the run.
    pub run_id: Uuid,
    /// Non-empty pages read.
    pub pages: u32,
    /// Tasks handed to the worker pool.
    pub submitted: usize,
    /// Tasks that ended `COMPLETED`.
    pub completed: usize,
    /// Tasks that ended `FAILED` or whose result could not be persisted.
    pub failed: usize,
    /// Tasks that could not be claimed at pickup.
    pub skipped: usize,
    /// Whether the run stopped because its budget ran out.
    pub timed_out: bool,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            pages: 0,
            submitted: 0,
            completed: 0,
            failed: 0,
            skipped: 0,
            timed_out: false,
        }
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Drives one processing run over the `PENDING` backlog.
#[derive(Debug)]
pub struct RunCoordinator {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<TaskDispatcher>,
    pool: WorkerPool,
    page_size: u32,
}

impl RunCoordinator {
    /// Create a coordinator reading pages of `page_size` tasks.
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<TaskDispatcher>,
        pool: WorkerPool,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            dispatcher,
            pool,
            page_size,
        }
    }

    /// Process pages until one comes back empty or `deadline` passes.
    ///
    /// A page is fully reported before the next is read. Once the deadline
    /// passes no further page is read; jobs already on the pool still run
    /// to completion and persist their own result. A failure reading a page
    /// aborts the run.
    pub async fn run(&self, deadline: Instant) -> AppResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.drain(RunSummary::new(run_id), deadline)
            .instrument(span)
            .await
    }

    async fn drain(&self, mut summary: RunSummary, deadline: Instant) -> AppResult<RunSummary> {
        let mut reader = ChunkedReader::new(
            Arc::clone(&self.store),
            TaskStatus::Pending,
            self.page_size,
        );

        'pages: loop {
            if Instant::now() >= deadline {
                summary.timed_out = true;
                break;
            }

            let page = reader.next_page().await.map_err(|e| {
                error!(error = %e, page = reader.pages_read() + 1, "Failed to read task page");
                e
            })?;
            if page.is_empty() {
                break;
            }
            summary.pages += 1;

            let (reports, mut results) = mpsc::unbounded_channel();
            let mut in_page = 0usize;
            for task in page.tasks {
                let task_id = task.id;
                match self.pool.submit(self.job(task, reports.clone())).await {
                    Ok(submission) => {
                        debug!(task_id, page = page.number, ?submission, "Task submitted");
                        in_page += 1;
                    }
                    Err(PoolError::ShutDown) => {
                        return Err(AppError::service_unavailable(
                            "Worker pool shut down during processing run",
                        ));
                    }
                }
            }
            drop(reports);
            summary.submitted += in_page;

            for _ in 0..in_page {
                match tokio::time::timeout_at(deadline, results.recv()).await {
                    Ok(Some(outcome)) => summary.record(&outcome),
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            page = page.number,
                            "Run budget exhausted, leaving remaining tasks to the pool"
                        );
                        summary.timed_out = true;
                        break 'pages;
                    }
                }
            }
        }

        info!(
            pages = summary.pages,
            submitted = summary.submitted,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            timed_out = summary.timed_out,
            "Processing run finished"
        );
        Ok(summary)
    }

    /// Dispatch one task, persist its final state and report the outcome.
    fn job(&self, task: Task, reports: mpsc::UnboundedSender<TaskOutcome>) -> Job {
        let dispatcher = Arc::clone(&self.dispatcher);
        let store = Arc::clone(&self.store);
        let span = tracing::Span::current();

        let job = async move {
            let (task, outcome) = dispatcher.dispatch(task).await;
            let outcome = match outcome {
                TaskOutcome::Skipped => TaskOutcome::Skipped,
                outcome => match store.finish(&task).await {
                    Ok(Some(_)) => outcome,
                    Ok(None) => {
                        error!(task_id = task.id, "Task row no longer in progress, result dropped");
                        TaskOutcome::Failed(OperationError::Store(format!(
                            "task {} is no longer IN_PROGRESS",
                            task.id
                        )))
                    }
                    Err(e) => {
                        error!(task_id = task.id, error = %e, "Failed to persist task result");
                        TaskOutcome::Failed(OperationError::Store(e.to_string()))
                    }
                },
            };
            // The coordinator may have stopped listening after its deadline.
            let _ = reports.send(outcome);
        };
        Box::pin(job.instrument(span))
    }
}
