//! Credential lifecycle policy.
//!
//! [`CredentialManager`] hands out access tokens for cloud accounts and
//! refreshes expired ones through the provider's [`TokenRefresher`].
//! Refreshes of the same account are serialized: a caller that waited on an
//! in-flight refresh re-reads the connection and reuses the new token
//! instead of refreshing again.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use drivehub_database::store::ConnectionStore;
use drivehub_entity::connection::{CloudConnection, CloudProvider};

use crate::executor::OperationError;

/// A token returned by a provider's token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    /// New bearer token.
    pub access_token: String,
    /// Lifetime in seconds, if the endpoint reported one.
    pub expires_in: Option<i64>,
    /// Rotated refresh token, if the endpoint issued one.
    pub refresh_token: Option<String>,
}

/// Obtains a fresh access token for a connection.
#[async_trait]
pub trait TokenRefresher: Send + Sync + std::fmt::Debug + 'static {
    /// Exchange the connection's long-lived credentials for a new token.
    async fn refresh(
        &self,
        connection: &CloudConnection,
    ) -> Result<RefreshedToken, OperationError>;
}

/// Hands out valid access tokens per cloud account.
#[derive(Debug)]
pub struct CredentialManager {
    store: Arc<dyn ConnectionStore>,
    refreshers: HashMap<CloudProvider, Arc<dyn TokenRefresher>>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    skew: Duration,
}

impl CredentialManager {
    /// Create a manager with no refreshers registered.
    pub fn new(store: Arc<dyn ConnectionStore>, skew: Duration) -> Self {
        Self {
            store,
            refreshers: HashMap::new(),
            locks: DashMap::new(),
            skew,
        }
    }

    /// Register the refresher used for `provider` connections.
    pub fn register(&mut self, provider: CloudProvider, refresher: Arc<dyn TokenRefresher>) {
        tracing::info!("Registered token refresher for provider '{}'", provider);
        self.refreshers.insert(provider, refresher);
    }

    /// Load a connection or fail with [`OperationError::AccountNotFound`].
    pub async fn connection(&self, account_id: i64) -> Result<CloudConnection, OperationError> {
        self.store
            .find_by_id(account_id)
            .await
            .map_err(|e| OperationError::Store(e.to_string()))?
            .ok_or(OperationError::AccountNotFound(account_id))
    }

    /// Return a non-expired access token for the account, refreshing it if
    /// needed.
    pub async fn valid_token(&self, account_id: i64) -> Result<String, OperationError> {
        let connection = self.connection(account_id).await?;
        if !self.needs_refresh(&connection) {
            return Ok(connection.access_token);
        }

        self.serialized(account_id, async {
            let connection = self.connection(account_id).await?;
            if !self.needs_refresh(&connection) {
                debug!(account_id, "Reusing token refreshed by a concurrent caller");
                return Ok(connection.access_token);
            }

            info!(account_id, provider = %connection.provider, "Access token expired, refreshing");
            self.refresh(connection).await
        })
        .await
    }

    /// Refresh after the provider rejected `rejected_token`.
    ///
    /// If another caller already replaced that token, the replacement is
    /// returned without a second refresh.
    pub async fn force_refresh(
        &self,
        account_id: i64,
        rejected_token: &str,
    ) -> Result<String, OperationError> {
        self.serialized(account_id, async {
            let connection = self.connection(account_id).await?;
            if connection.access_token != rejected_token && !self.needs_refresh(&connection) {
                return Ok(connection.access_token);
            }

            info!(account_id, provider = %connection.provider, "Access token rejected, refreshing");
            self.refresh(connection).await
        })
        .await
    }

    fn needs_refresh(&self, connection: &CloudConnection) -> bool {
        connection.access_token.is_empty() || connection.is_expired(Utc::now(), self.skew)
    }

    /// Run `work` holding the account's refresh lock.
    ///
    /// The lock entry is dropped afterwards unless another caller is
    /// already waiting on it, so the map only holds accounts with a
    /// refresh in flight.
    async fn serialized<F>(&self, account_id: i64, work: F) -> Result<String, OperationError>
    where
        F: Future<Output = Result<String, OperationError>>,
    {
        let lock = self.lock_for(account_id);
        let result = {
            let _guard = lock.lock().await;
            work.await
        };
        // One reference in the map, one here.
        self.locks.remove_if(&account_id, |_, entry| Arc::strong_count(entry) <= 2);
        result
    }

    fn lock_for(&self, account_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn refresh(&self, mut connection: CloudConnection) -> Result<String, OperationError> {
        let refresher =
            self.refreshers
                .get(&connection.provider)
                .ok_or_else(|| OperationError::Credentials {
                    account_id: connection.id,
                    message: format!("No token refresher for provider {}", connection.provider),
                })?;

        let token = refresher.refresh(&connection).await?;

        connection.access_token = token.access_token;
        connection.expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(rotated) = token.refresh_token {
            connection.refresh_token = Some(rotated);
        }

        let saved = self
            .store
            .save(&connection)
            .await
            .map_err(|e| OperationError::Store(e.to_string()))?;

        info!(
            account_id = saved.id,
            expires_at = ?saved.expires_at,
            "Stored refreshed access token"
        );
        Ok(saved.access_token)
    }
}

/// Token endpoint response shared by the OAuth providers.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// POST a form to an OAuth token endpoint and decode the token response.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
    account_id: i64,
) -> Result<RefreshedToken, OperationError> {
    let response = client
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| OperationError::Credentials {
            account_id,
            message: format!("Token request failed: {e}"),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OperationError::Credentials {
            account_id,
            message: format!(
                "Failed to refresh token: HTTP {}: {}",
                status.as_u16(),
                crate::http::error_message(&body)
            ),
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| OperationError::Credentials {
            account_id,
            message: format!("Invalid token response: {e}"),
        })?;

    Ok(RefreshedToken {
        access_token: token.access_token,
        expires_in: token.expires_in,
        refresh_token: token.refresh_token,
    })
}
