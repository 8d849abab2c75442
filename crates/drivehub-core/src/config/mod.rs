//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod database;
pub mod logging;
pub mod providers;
pub mod scheduler;
pub mod worker;

use serde::{Deserialize, Serialize};

pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::providers::{DropboxConfig, GoogleDriveConfig, OneDriveConfig, ProvidersConfig};
pub use self::scheduler::SchedulerConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Processing scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Cloud provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `DRIVEHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DRIVEHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the worker pool and scheduler cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.worker.core_size == 0 {
            return Err(AppError::configuration("worker.core_size must be at least 1"));
        }
        if self.worker.max_size < self.worker.core_size {
            return Err(AppError::configuration(
                "worker.max_size must not be smaller than worker.core_size",
            ));
        }
        if self.worker.queue_depth == 0 {
            return Err(AppError::configuration("worker.queue_depth must be at least 1"));
        }
        if self.scheduler.page_size == 0 {
            return Err(AppError::configuration("scheduler.page_size must be at least 1"));
        }
        if self.scheduler.interval_seconds == 0 {
            return Err(AppError::configuration(
                "scheduler.interval_seconds must be at least 1",
            ));
        }
        Ok(())
    }
}
