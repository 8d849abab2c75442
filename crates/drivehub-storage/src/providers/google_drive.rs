//! Google Drive executor (Drive v3 REST).
//!
//! Cross-account copy shares the source file with the destination account
//! and then copies it using the destination account's token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use drivehub_core::config::providers::GoogleDriveConfig;
use drivehub_core::result::AppResult;
use drivehub_entity::connection::{CloudConnection, CloudProvider};
use drivehub_entity::task::Task;

use crate::credentials::{CredentialManager, RefreshedToken, TokenRefresher, request_token};
use crate::executor::{OperationError, OperationExecutor};
use crate::http::{ProviderHttp, build_client, folder_or_root};

#[derive(Debug, Deserialize)]
struct FileName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CopiedFile {
    id: String,
}

/// Executes COPY and DELETE against Google Drive.
#[derive(Debug, Clone)]
pub struct GoogleDriveExecutor {
    http: ProviderHttp,
    api_base: String,
}

impl GoogleDriveExecutor {
    /// Create an executor talking to `config.api_base`.
    pub fn new(
        config: &GoogleDriveConfig,
        credentials: Arc<CredentialManager>,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(CloudProvider::GoogleDrive, credentials, timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn file_url(&self, file_id: &str) -> String {
        format!("{}/files/{}", self.api_base, file_id)
    }
}

#[async_trait]
impl OperationExecutor for GoogleDriveExecutor {
    fn provider(&self) -> CloudProvider {
        CloudProvider::GoogleDrive
    }

    async fn copy(&self, task: &Task) -> Result<(), OperationError> {
        let (folder, destination_account) =
            task.destination().map_err(OperationError::InvalidTask)?;
        let destination_email = task
            .destination_email
            .as_deref()
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| {
                OperationError::InvalidTask(
                    "Destination email is required for file sharing".to_string(),
                )
            })?;
        let file_id = task.source_path.as_str();

        let source: FileName = self
            .http
            .send_json(task.source_account_id, |client, token| {
                client
                    .get(self.file_url(file_id))
                    .bearer_auth(token)
                    .query(&[("fields", "name"), ("supportsAllDrives", "true")])
            })
            .await?;
        debug!(task_id = task.id, file_name = %source.name, "Resolved Google Drive source file");

        let permission = json!({
            "type": "user",
            "role": "writer",
            "emailAddress": destination_email,
        });
        self.http
            .send(task.source_account_id, |client, token| {
                client
                    .post(format!("{}/permissions", self.file_url(file_id)))
                    .bearer_auth(token)
                    .query(&[("fields", "id"), ("supportsAllDrives", "true")])
                    .json(&permission)
            })
            .await?;
        debug!(task_id = task.id, "Granted writer permission to destination account");

        let metadata = json!({
            "name": source.name,
            "parents": [folder_or_root(folder)],
        });
        let copied: CopiedFile = self
            .http
            .send_json(destination_account, |client, token| {
                client
                    .post(format!("{}/copy", self.file_url(file_id)))
                    .bearer_auth(token)
                    .query(&[("fields", "id,name,parents"), ("supportsAllDrives", "true")])
                    .json(&metadata)
            })
            .await?;

        info!(task_id = task.id, new_file_id = %copied.id, "Google Drive file copied");
        Ok(())
    }

    async fn delete_by_account(&self, path: &str, account_id: i64) -> Result<(), OperationError> {
        self.http
            .send(account_id, |client, token| {
                client
                    .delete(self.file_url(path))
                    .bearer_auth(token)
                    .query(&[("supportsAllDrives", "true")])
            })
            .await?;
        info!(account_id, file_id = %path, "Google Drive file deleted");
        Ok(())
    }
}

/// Refreshes Google OAuth tokens with the `refresh_token` grant.
#[derive(Debug, Clone)]
pub struct GoogleTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleTokenRefresher {
    /// Create a refresher for the configured OAuth client.
    pub fn new(config: &GoogleDriveConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for GoogleTokenRefresher {
    async fn refresh(
        &self,
        connection: &CloudConnection,
    ) -> Result<RefreshedToken, OperationError> {
        let refresh_token =
            connection
                .refresh_token
                .as_deref()
                .ok_or_else(|| OperationError::Credentials {
                    account_id: connection.id,
                    message: "No refresh token stored for Google Drive account".to_string(),
                })?;

        request_token(
            &self.client,
            &self.token_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            connection.id,
        )
        .await
    }
}
