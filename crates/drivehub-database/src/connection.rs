//! PostgreSQL pool setup.

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use drivehub_core::config::DatabaseConfig;
use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;

/// Shared sqlx pool used by the task and connection repositories.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Parse `config.url` and open the pool.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let options = PgConnectOptions::from_str(&config.url).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Invalid database.url", e)
        })?;

        info!(
            target_db = %describe(&options),
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(config.idle_timeout())
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to database: {e}"),
                    e,
                )
            })?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections, waiting for checked-out ones to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// `user@host:port/database`, never including the password.
fn describe(options: &PgConnectOptions) -> String {
    format!(
        "{}@{}:{}/{}",
        options.get_username(),
        options.get_host(),
        options.get_port(),
        options.get_database().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_omits_password() {
        let options =
            PgConnectOptions::from_str("postgres://drivehub:secret@db:6543/drivehub").unwrap();
        let rendered = describe(&options);
        assert_eq!(rendered, "drivehub@db:6543/drivehub");
        assert!(!rendered.contains("secret"));
    }
}
