//! Fixed-interval scheduler with a single-flight guard.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use drivehub_core::config::SchedulerConfig;
use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;

use crate::runner::{RunCoordinator, RunSummary};

/// Allows at most one holder at a time.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    /// Create a released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the guard, or `None` if it is already held.
    pub fn try_acquire(&self) -> Option<FlightPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit { flight: self })
    }

    /// Whether the guard is currently held.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; releases the guard when dropped.
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct FlightPermit<'a> {
    flight: &'a SingleFlight,
}

impl fmt::Debug for FlightPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightPermit").finish()
    }
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.flight.running.store(false, Ordering::Release);
    }
}

/// Something the scheduler can start once per tick.
#[async_trait]
pub trait ProcessingRun: Send + Sync + fmt::Debug + 'static {
    /// Perform one run that should stop starting new work after `deadline`.
    async fn run(&self, deadline: Instant) -> AppResult<RunSummary>;
}

#[async_trait]
impl ProcessingRun for RunCoordinator {
    async fn run(&self, deadline: Instant) -> AppResult<RunSummary> {
        RunCoordinator::run(self, deadline).await
    }
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A run executed to completion or to its budget.
    Completed(RunSummary),
    /// Another run was still active; nothing happened.
    Skipped,
    /// The run failed and was abandoned.
    Aborted(AppError),
}

/// Starts processing runs, never more than one at a time.
#[derive(Debug)]
pub struct Scheduler {
    run: Arc<dyn ProcessingRun>,
    guard: Arc<SingleFlight>,
    interval: Duration,
    budget: Duration,
}

impl Scheduler {
    /// Create a scheduler sharing `guard` with anything else that must not
    /// overlap a run.
    pub fn new(
        run: Arc<dyn ProcessingRun>,
        guard: Arc<SingleFlight>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            run,
            guard,
            interval: config.interval(),
            budget: config.run_budget(),
        }
    }

    /// Interval between ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a run unless one is already active.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_permit) = self.guard.try_acquire() else {
            trace!("Processing run still active, skipping tick");
            return TickOutcome::Skipped;
        };

        let deadline = Instant::now() + self.budget;
        match AssertUnwindSafe(self.run.run(deadline)).catch_unwind().await {
            Ok(Ok(summary)) => TickOutcome::Completed(summary),
            Ok(Err(e)) => {
                error!(error = %e, "Processing run aborted");
                TickOutcome::Aborted(e)
            }
            Err(_) => {
                error!("Processing run panicked");
                TickOutcome::Aborted(AppError::internal("Processing run panicked"))
            }
        }
    }

    /// Tick on a fixed interval until `cancel` fires.
    pub async fn run_until(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "Scheduler loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("Scheduler loop stopped");
    }
}
