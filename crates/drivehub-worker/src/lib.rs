//! Scheduled task-queue processing for DriveHub.
//!
//! This crate provides:
//! - A task dispatcher that owns the task status state machine
//! - A bounded worker pool with caller-runs backpressure
//! - A chunked reader over the pending backlog
//! - A run coordinator that drains the backlog page by page
//! - A single-flight scheduler and its periodic trigger

pub mod dispatcher;
pub mod pool;
pub mod reader;
pub mod runner;
pub mod scheduler;
pub mod trigger;

#[cfg(test)]
mod test_support;

pub use dispatcher::{TaskDispatcher, TaskOutcome};
pub use pool::{PoolError, PoolStats, Submission, WorkerPool};
pub use reader::{ChunkedReader, Page};
pub use runner::{RunCoordinator, RunSummary};
pub use scheduler::{FlightPermit, ProcessingRun, Scheduler, SingleFlight, TickOutcome};
pub use trigger::PeriodicTrigger;
