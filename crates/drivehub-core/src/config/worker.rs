//! Worker pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded worker pool configuration.
///
/// Submissions beyond `max_size` busy workers and a full queue run inline on
/// the submitting task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Workers kept alive even when idle.
    #[serde(default = "default_core_size")]
    pub core_size: usize,
    /// Upper bound on concurrently running workers.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Capacity of the pending-work queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Idle time after which a worker above `core_size` exits.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// Grace period for draining outstanding work on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl WorkerConfig {
    /// Idle keep-alive as a [`Duration`].
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            core_size: default_core_size(),
            max_size: default_max_size(),
            queue_depth: default_queue_depth(),
            keep_alive_seconds: default_keep_alive(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_core_size() -> usize {
    2
}

fn default_max_size() -> usize {
    10
}

fn default_queue_depth() -> usize {
    10
}

fn default_keep_alive() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    60
}
