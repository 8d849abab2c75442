//! Cloud provider API credentials and endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every cloud provider client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Treat a token as expired this many seconds before its recorded expiry.
    #[serde(default)]
    pub refresh_skew_seconds: u64,
    /// Google Drive application settings.
    #[serde(default)]
    pub google_drive: GoogleDriveConfig,
    /// Dropbox application settings.
    #[serde(default)]
    pub dropbox: DropboxConfig,
    /// OneDrive (Microsoft Graph) application settings.
    #[serde(default)]
    pub onedrive: OneDriveConfig,
}

impl ProvidersConfig {
    /// HTTP timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            refresh_skew_seconds: 0,
            google_drive: GoogleDriveConfig::default(),
            dropbox: DropboxConfig::default(),
            onedrive: OneDriveConfig::default(),
        }
    }
}

/// Google Drive OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveConfig {
    /// OAuth client ID.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Drive v3 REST base URL.
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
    /// OAuth token endpoint.
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
}

impl Default for GoogleDriveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: default_google_api_base(),
            token_url: default_google_token_url(),
        }
    }
}

/// Dropbox app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropboxConfig {
    /// App key.
    #[serde(default)]
    pub client_id: String,
    /// App secret.
    #[serde(default)]
    pub client_secret: String,
    /// RPC endpoint base URL.
    #[serde(default = "default_dropbox_api_base")]
    pub api_base: String,
    /// Content (upload/download) endpoint base URL.
    #[serde(default = "default_dropbox_content_base")]
    pub content_base: String,
    /// OAuth token endpoint.
    #[serde(default = "default_dropbox_token_url")]
    pub token_url: String,
}

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base: default_dropbox_api_base(),
            content_base: default_dropbox_content_base(),
            token_url: default_dropbox_token_url(),
        }
    }
}

/// Microsoft Entra ID application used for OneDrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneDriveConfig {
    /// Application (client) ID.
    #[serde(default)]
    pub client_id: String,
    /// Client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Microsoft Graph base URL.
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    /// Identity authority; the tenant ID is appended per connection.
    #[serde(default = "default_authority")]
    pub authority: String,
}

impl Default for OneDriveConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            graph_base: default_graph_base(),
            authority: default_authority(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_google_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_dropbox_api_base() -> String {
    "https://api.dropboxapi.com/2".to_string()
}

fn default_dropbox_content_base() -> String {
    "https://content.dropboxapi.com/2".to_string()
}

fn default_dropbox_token_url() -> String {
    "https://api.dropboxapi.com/oauth2/token".to_string()
}

fn default_graph_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}
