//! Authorized HTTP plumbing shared by the provider executors.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_entity::connection::CloudProvider;

use crate::credentials::CredentialManager;
use crate::executor::OperationError;

/// Longest slice of an unparseable error body kept in a message.
const MAX_ERROR_BODY: usize = 300;

/// HTTP client bound to one provider and the shared credential manager.
#[derive(Debug, Clone)]
pub(crate) struct ProviderHttp {
    client: Client,
    credentials: Arc<CredentialManager>,
    provider: CloudProvider,
}

impl ProviderHttp {
    pub(crate) fn new(
        provider: CloudProvider,
        credentials: Arc<CredentialManager>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(timeout)?,
            credentials,
            provider,
        })
    }

    pub(crate) fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// Send a request authorized as `account_id`.
    ///
    /// On HTTP 401 the token is force-refreshed and the request is rebuilt
    /// and sent once more.
    pub(crate) async fn send<F>(
        &self,
        account_id: i64,
        build: F,
    ) -> Result<Response, OperationError>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let token = self.credentials.valid_token(account_id).await?;
        let response = self.execute(build(&self.client, &token)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.check(response).await;
        }

        warn!(
            account_id,
            provider = %self.provider,
            "Provider rejected access token, retrying after refresh"
        );
        let token = self.credentials.force_refresh(account_id, &token).await?;
        let response = self.execute(build(&self.client, &token)).await?;
        self.check(response).await
    }

    /// Send, then decode a JSON body.
    pub(crate) async fn send_json<T, F>(
        &self,
        account_id: i64,
        build: F,
    ) -> Result<T, OperationError>
    where
        T: DeserializeOwned,
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let response = self.send(account_id, build).await?;
        response.json::<T>().await.map_err(|e| {
            OperationError::Transport(format!("Invalid {} response: {e}", self.provider))
        })
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, OperationError> {
        request.send().await.map_err(|e| {
            OperationError::Transport(format!("{} request failed: {e}", self.provider))
        })
    }

    async fn check(&self, response: Response) -> Result<Response, OperationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(OperationError::Provider {
            provider: self.provider,
            status: status.as_u16(),
            message: error_message(&body),
        })
    }
}

/// Build a reqwest client with the configured timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("drivehub/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
        })
}

/// Pull the human-readable reason out of a vendor error body.
///
/// Understands Google/Graph (`error.message`), Dropbox (`error_summary`)
/// and OAuth (`error_description`, `error`) shapes.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error_summary"),
            value.get("error_description"),
            value.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error details".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Map an empty or `/` destination folder to the provider's root alias.
pub(crate) fn folder_or_root(folder: &str) -> &str {
    match folder.trim() {
        "" | "/" => "root",
        other => other,
    }
}
