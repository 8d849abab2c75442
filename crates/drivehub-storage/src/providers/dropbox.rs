//! Dropbox executor (API v2).
//!
//! Dropbox has no cross-account copy, so a copy downloads the source bytes
//! and uploads them into the destination account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use drivehub_core::config::providers::DropboxConfig;
use drivehub_core::result::AppResult;
use drivehub_entity::connection::{CloudConnection, CloudProvider};
use drivehub_entity::task::Task;

use crate::credentials::{CredentialManager, RefreshedToken, TokenRefresher, request_token};
use crate::executor::{OperationError, OperationExecutor};
use crate::http::{ProviderHttp, build_client};

/// Header carrying the JSON arguments of content endpoints.
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

#[derive(Debug, Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

#[derive(Debug, Serialize)]
struct UploadArg<'a> {
    path: &'a str,
    mode: &'static str,
    autorename: bool,
    mute: bool,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

/// Executes COPY and DELETE against Dropbox.
#[derive(Debug, Clone)]
pub struct DropboxExecutor {
    http: ProviderHttp,
    api_base: String,
    content_base: String,
}

impl DropboxExecutor {
    /// Create an executor for the configured RPC and content endpoints.
    pub fn new(
        config: &DropboxConfig,
        credentials: Arc<CredentialManager>,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            http: ProviderHttp::new(CloudProvider::Dropbox, credentials, timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            content_base: config.content_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl OperationExecutor for DropboxExecutor {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Dropbox
    }

    async fn copy(&self, task: &Task) -> Result<(), OperationError> {
        let (folder, destination_account) =
            task.destination().map_err(OperationError::InvalidTask)?;
        let target = destination_full_path(folder, &task.source_path);

        let download_arg = api_arg(&PathArg {
            path: &task.source_path,
        })?;
        let response = self
            .http
            .send(task.source_account_id, |client, token| {
                client
                    .post(format!("{}/files/download", self.content_base))
                    .bearer_auth(token)
                    .header(API_ARG_HEADER, download_arg.as_str())
            })
            .await?;
        let content = response
            .bytes()
            .await
            .map_err(|e| OperationError::Transport(format!("Dropbox download failed: {e}")))?;
        debug!(task_id = task.id, size = content.len(), "Downloaded Dropbox source file");

        let upload_arg = api_arg(&UploadArg {
            path: &target,
            mode: "overwrite",
            autorename: false,
            mute: false,
        })?;
        let uploaded: UploadedFile = self
            .http
            .send_json(destination_account, |client, token| {
                client
                    .post(format!("{}/files/upload", self.content_base))
                    .bearer_auth(token)
                    .header(API_ARG_HEADER, upload_arg.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(content.clone())
            })
            .await?;

        info!(
            task_id = task.id,
            destination = %target,
            new_file_id = %uploaded.id,
            "Dropbox file copied"
        );
        Ok(())
    }

    async fn delete_by_account(&self, path: &str, account_id: i64) -> Result<(), OperationError> {
        if path.trim().is_empty() {
            return Err(OperationError::InvalidTask(
                "Dropbox delete requires a non-empty path".to_string(),
            ));
        }

        let arg = PathArg { path };
        self.http
            .send(account_id, |client, token| {
                client
                    .post(format!("{}/files/delete_v2", self.api_base))
                    .bearer_auth(token)
                    .json(&arg)
            })
            .await?;
        info!(account_id, path = %path, "Dropbox file deleted");
        Ok(())
    }
}

/// Refreshes Dropbox short-lived tokens with the `refresh_token` grant.
#[derive(Debug, Clone)]
pub struct DropboxTokenRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl DropboxTokenRefresher {
    /// Create a refresher for the configured Dropbox app.
    pub fn new(config: &DropboxConfig, timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }
}

#[async_trait]
impl TokenRefresher for DropboxTokenRefresher {
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
                    message: "No refresh token stored for Dropbox account".to_string(),
                })?;

        request_token(
            &self.client,
            &self.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ],
            connection.id,
        )
        .await
    }
}

/// Join the destination folder with the source file name.
pub(crate) fn destination_full_path(folder: &str, source_path: &str) -> String {
    let file_name = source_path.rsplit('/').next().unwrap_or(source_path);
    if folder.ends_with('/') {
        format!("{folder}{file_name}")
    } else {
        format!("{folder}/{file_name}")
    }
}

/// Serialize a `Dropbox-API-Arg` header value.
///
/// HTTP headers must be ASCII, so every non-ASCII character is written as a
/// JSON `\uXXXX` escape (surrogate pairs above the BMP).
pub(crate) fn api_arg<T: Serialize>(arg: &T) -> Result<String, OperationError> {
    let json = serde_json::to_string(arg)
        .map_err(|e| OperationError::InvalidTask(format!("Unencodable Dropbox argument: {e}")))?;

    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            escaped.push_str(&format!("\\u{unit:04x}"));
        }
    }
    Ok(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use drivehub_database::memory::MemoryConnectionStore;
    use drivehub_entity::task::{OperationKind, TaskStatus};

    fn connection(id: i64) -> CloudConnection {
        CloudConnection {
            id,
            access_token: format!("token-{id}"),
            refresh_token: Some(format!("refresh-{id}")),
            expires_at: None,
            user_id: 1,
            email: format!("user{id}@example.com"),
            provider: CloudProvider::Dropbox,
            tenant_id: None,
            created_at: Utc::now(),
        }
    }

    async fn executor(server: &MockServer) -> DropboxExecutor {
        let store = Arc::new(MemoryConnectionStore::new());
        store.insert(connection(1)).await;
        store.insert(connection(2)).await;

        let config = DropboxConfig {
            client_id: "app".to_string(),
            client_secret: "secret".to_string(),
            api_base: format!("{}/rpc", server.uri()),
            content_base: format!("{}/content", server.uri()),
            token_url: format!("{}/oauth2/token", server.uri()),
        };
        let credentials = CredentialManager::new(store, chrono::Duration::zero());
        DropboxExecutor::new(&config, Arc::new(credentials), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_destination_full_path() {
        assert_eq!(destination_full_path("/backup", "/docs/a.txt"), "/backup/a.txt");
        assert_eq!(destination_full_path("/backup/", "/docs/a.txt"), "/backup/a.txt");
        assert_eq!(destination_full_path("", "a.txt"), "/a.txt");
    }

    #[test]
    fn test_api_arg_escapes_non_ascii() {
        let arg = api_arg(&PathArg { path: "/Café 📁.txt" }).unwrap();
        assert_eq!(arg, r#"{"path":"/Caf\u00e9 \ud83d\udcc1.txt"}"#);
        assert!(arg.is_ascii());
    }

    #[tokio::test]
    async fn test_copy_downloads_then_uploads_with_overwrite() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content/files/download"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"quarterly numbers".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/content/files/upload"))
            .and(header("authorization", "Bearer token-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "id:uploaded",
                "name": "report.txt",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let now = Utc::now();
        let task = Task {
            id: 3,
            operation_kind: OperationKind::Copy,
            provider: CloudProvider::Dropbox,
            source_path: "/inbox/report.txt".to_string(),
            destination_path: Some("/archive".to_string()),
            source_account_id: 1,
            destination_account_id: Some(2),
            source_email: None,
            destination_email: None,
            user_id: "u1".to_string(),
            status: TaskStatus::InProgress,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        executor(&server).await.copy(&task).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let upload = requests
            .iter()
            .find(|r| r.url.path() == "/content/files/upload")
            .unwrap();
        assert_eq!(upload.body, b"quarterly numbers".to_vec());
        let arg: serde_json::Value = serde_json::from_str(
            upload.headers.get(API_ARG_HEADER).unwrap().to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(arg["path"], "/archive/report.txt");
        assert_eq!(arg["mode"], "overwrite");
    }

    #[tokio::test]
    async fn test_delete_rejects_empty_path() {
        let server = MockServer::start().await;
        let err = executor(&server)
            .await
            .delete_by_account("  ", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidTask(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_conflict_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/files/delete_v2"))
            .and(body_json(json!({"path": "/gone.txt"})))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error_summary": "path_lookup/not_found/",
                "error": {".tag": "path_lookup"},
            })))
            .mount(&server)
            .await;

        let err = executor(&server)
            .await
            .delete_by_account("/gone.txt", 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::Provider {
                provider: CloudProvider::Dropbox,
                status: 409,
                message: "path_lookup/not_found/".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_token_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sl.new",
                "token_type": "bearer",
                "expires_in": 14400,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = DropboxConfig {
            token_url: format!("{}/oauth2/token", server.uri()),
            ..DropboxConfig::default()
        };
        let refresher = DropboxTokenRefresher::new(&config, Duration::from_secs(5)).unwrap();
        let token = refresher.refresh(&connection(1)).await.unwrap();
        assert_eq!(token.access_token, "sl.new");
        assert_eq!(token.expires_in, Some(14400));
        assert_eq!(token.refresh_token, None);
    }
}
