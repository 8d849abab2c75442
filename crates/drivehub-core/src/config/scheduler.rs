//! Task processing scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed-interval scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the periodic trigger is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between ticks.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Wall-clock budget of a single processing run, in seconds.
    #[serde(default = "default_run_budget")]
    pub run_budget_seconds: u64,
    /// Number of tasks read per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl SchedulerConfig {
    /// Tick period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Run budget as a [`Duration`].
    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_interval(),
            run_budget_seconds: default_run_budget(),
            page_size: default_page_size(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

fn default_run_budget() -> u64 {
    55
}

fn default_page_size() -> u32 {
    20
}
