//! Cloud connection repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;
use drivehub_entity::connection::CloudConnection;

use crate::store::ConnectionStore;

/// Repository for the `cloud_connections` table.
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pool: PgPool,
}

impl ConnectionRepository {
    /// Create a new connection repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for ConnectionRepository {
    async fn find_by_id(&self, account_id: i64) -> AppResult<Option<CloudConnection>> {
        sqlx::query_as::<_, CloudConnection>("SELECT * FROM cloud_connections WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find connection", e)
            })
    }

    async fn save(&self, connection: &CloudConnection) -> AppResult<CloudConnection> {
        sqlx::query_as::<_, CloudConnection>(
            "UPDATE cloud_connections SET access_token = $2, refresh_token = $3, expires_at = $4 \
             WHERE id = $1 RETURNING *",
        )
        .bind(connection.id)
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(connection.expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to save connection", e))?
        .ok_or_else(|| AppError::not_found(format!("Connection {} not found", connection.id)))
    }
}
