//! OneDrive executor (Microsoft Graph).
//!
//! Drives are addressed through `users/{email}/drive` with app-only tokens
//! obtained per tenant, so each connection must carry its tenant id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use drivehub_core::config::providers::OneDriveConfig;
use drivehub_core::result::AppResult;
use drivehub_entity::connection::{CloudConnection, CloudProvider};
use drivehub_entity::task::Task;

use crate::credentials::{CredentialManager, RefreshedToken, TokenRefresher, request_token};
use crate::executor::{OperationError, OperationExecutor};
use crate::http::{ProviderHttp, build_client, folder_or_root};

/// Scope requested with the client-credentials grant.
const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Drive {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SharingPermission {
    link: SharingLink,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SharingLink {
    web_url: String,
}

/// Executes COPY and DELETE against OneDrive for Business.
#[derive(Debug, Clone)]
pub struct OneDriveExecutor {
    http: ProviderHttp,
    graph_base: String,
}

impl OneDriveExecutor {
    /// Create an executor talking to `config.graph_base`.
    pub fn new(
        config: &OneDriveConfig,
        credentials: Arc<CredentialManager>,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(CloudProvider::OneDrive, credentials, timeout)?,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
        })
    }

    fn drive_url(&self, email: &str) -> String {
        format!("{}/users/{}/drive", self.graph_base, email)
    }

    async fn account_email(&self, account_id: i64) -> Result<String, OperationError> {
        Ok(self.http.credentials().connection(account_id).await?.email)
    }
}

#[async_trait]
impl OperationExecutor for OneDriveExecutor {
    fn provider(&self) -> CloudProvider {
        CloudProvider::OneDrive
    }

    async fn copy(&self, task: &Task) -> Result<(), OperationError> {
        let (folder, destination_account) =
            task.destination().map_err(OperationError::InvalidTask)?;
        let source_drive = self.drive_url(&self.account_email(task.source_account_id).await?);
        let destination_drive = self.drive_url(&self.account_email(destination_account).await?);

        let item: DriveItem = self
            .http
            .send_json(task.source_account_id, |client, token| {
                client
                    .get(format!("{}/items/{}", source_drive, task.source_path))
                    .bearer_auth(token)
            })
            .await?;
        debug!(task_id = task.id, item_name = %item.name, "Resolved OneDrive source item");

        let link_request = json!({"type": "view", "scope": "organization"});
        let shared: SharingPermission = self
            .http
            .send_json(task.source_account_id, |client, token| {
                client
                    .post(format!("{}/items/{}/createLink", source_drive, item.id))
                    .bearer_auth(token)
                    .json(&link_request)
            })
            .await?;
        debug!(task_id = task.id, link = %shared.link.web_url, "Created OneDrive sharing link");

        let drive: Drive = self
            .http
            .send_json(destination_account, |client, token| {
                client.get(destination_drive.as_str()).bearer_auth(token)
            })
            .await?;
        let parent_id = match folder_or_root(folder) {
            "root" => {
                let root: DriveItem = self
                    .http
                    .send_json(destination_account, |client, token| {
                        client
                            .get(format!("{destination_drive}/root"))
                            .bearer_auth(token)
                    })
                    .await?;
                root.id
            }
            folder_id => folder_id.to_string(),
        };

        let copy_request = json!({
            "parentReference": {"driveId": drive.id, "id": parent_id},
            "name": item.name,
        });
        self.http
            .send(task.source_account_id, |client, token| {
                client
                    .post(format!("{}/items/{}/copy", source_drive, item.id))
                    .bearer_auth(token)
                    .json(&copy_request)
            })
            .await?;

        info!(task_id = task.id, destination_drive = %drive.id, "OneDrive copy accepted");
        Ok(())
    }

    async fn delete_by_account(&self, path: &str, account_id: i64) -> Result<(), OperationError> {
        let drive = self.drive_url(&self.account_email(account_id).await?);
        self.http
            .send(account_id, |client, token| {
                client
                    .delete(format!("{drive}/items/{path}"))
                    .bearer_auth(token)
            })
            .await?;
        info!(account_id, item_id = %path, "OneDrive item deleted");
        Ok(())
    }
}

/// Obtains app-only Graph tokens with the client-credentials grant.
#[derive(Debug, Clone)]
pub struct OneDriveTokenRefresher {
    client: reqwest::Client,
    authority: String,
    client_id: String,
    client_secret: String,
}

impl OneDriveTokenRefresher {
    /// Create a refresher for the configured Entra ID application.
    pub fn new(config: &OneDriveConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            authority: config.authority.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for OneDriveTokenRefresher {
    async fn refresh(
        &self,
        connection: &CloudConnection,
    ) -> Result<RefreshedToken, OperationError> {
        let tenant = connection
            .tenant()
            .ok_or_else(|| OperationError::Credentials {
                account_id: connection.id,
                message: format!("TenantId is missing for account {}", connection.email),
            })?;

        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, tenant);
        request_token(
            &self.client,
            &url,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", GRAPH_DEFAULT_SCOPE),
                ("grant_type", "client_credentials"),
            ],
            connection.id,
        )
        .await
    }
}
