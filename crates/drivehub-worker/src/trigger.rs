//! Periodic trigger driving the scheduler from a cron job scheduler.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use drivehub_core::error::AppError;

use crate::scheduler::{Scheduler, TickOutcome};

/// Fires [`Scheduler::tick`] every scheduler interval.
pub struct PeriodicTrigger {
    scheduler: JobScheduler,
    target: Arc<Scheduler>,
}

impl std::fmt::Debug for PeriodicTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTrigger")
            .field("interval", &self.target.interval())
            .finish()
    }
}

impl PeriodicTrigger {
    /// Create a trigger for `target`. Nothing fires until [`start`](Self::start).
    pub async fn new(target: Arc<Scheduler>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, target })
    }

    /// Register the repeating tick and start firing.
    pub async fn start(&self) -> Result<(), AppError> {
        let target = Arc::clone(&self.target);
        let interval = target.interval();
        let job = CronJob::new_repeated_async(interval, move |_uuid, _lock| {
            let target = Arc::clone(&target);
            Box::pin(async move {
                if let TickOutcome::Completed(summary) = target.tick().await {
                    tracing::debug!(run_id = %summary.run_id, "Scheduled run finished");
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create processing schedule: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add processing schedule: {}", e)))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Registered: task processing (every {}s)", interval.as_secs());
        Ok(())
    }

    /// Stop firing. A run already in progress is not interrupted.
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Periodic trigger shut down");
        Ok(())
    }
}
