//! Cloud provider executors and token refreshers.

pub mod dropbox;
pub mod google_drive;
pub mod onedrive;

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use drivehub_core::config::providers::ProvidersConfig;
use drivehub_core::result::AppResult;
use drivehub_database::store::ConnectionStore;
use drivehub_entity::connection::CloudProvider;

use crate::credentials::CredentialManager;
use crate::executor::OperationExecutor;

pub use dropbox::{DropboxExecutor, DropboxTokenRefresher};
pub use google_drive::{GoogleDriveExecutor, GoogleTokenRefresher};
pub use onedrive::{OneDriveExecutor, OneDriveTokenRefresher};

/// Build a credential manager with a refresher for every provider.
pub fn build_credential_manager(
    config: &ProvidersConfig,
    store: Arc<dyn ConnectionStore>,
) -> AppResult<CredentialManager> {
    let timeout = config.request_timeout();
    let skew = Duration::seconds(i64::try_from(config.refresh_skew_seconds).unwrap_or(i64::MAX));

    let mut manager = CredentialManager::new(store, skew);
    manager.register(
        CloudProvider::GoogleDrive,
        Arc::new(GoogleTokenRefresher::new(&config.google_drive, timeout)?),
    );
    manager.register(
        CloudProvider::Dropbox,
        Arc::new(DropboxTokenRefresher::new(&config.dropbox, timeout)?),
    );
    manager.register(
        CloudProvider::OneDrive,
        Arc::new(OneDriveTokenRefresher::new(&config.onedrive, timeout)?),
    );

    for (provider, client_id) in [
        (CloudProvider::GoogleDrive, &config.google_drive.client_id),
        (CloudProvider::Dropbox, &config.dropbox.client_id),
        (CloudProvider::OneDrive, &config.onedrive.client_id),
    ] {
        if client_id.is_empty() {
            warn!(provider = %provider, "No client_id configured; token refresh will fail");
        }
    }

    Ok(manager)
}

/// Build one executor per supported provider.
pub fn build_executors(
    config: &ProvidersConfig,
    credentials: Arc<CredentialManager>,
) -> AppResult<Vec<Arc<dyn OperationExecutor>>> {
    let timeout = config.request_timeout();
    let mut executors: Vec<Arc<dyn OperationExecutor>> = Vec::with_capacity(3);
    executors.push(Arc::new(GoogleDriveExecutor::new(
        &config.google_drive,
        Arc::clone(&credentials),
        timeout,
    )?));
    executors.push(Arc::new(DropboxExecutor::new(
        &config.dropbox,
        Arc::clone(&credentials),
        timeout,
    )?));
    executors.push(Arc::new(OneDriveExecutor::new(
        &config.onedrive,
        credentials,
        timeout,
    )?));
    Ok(executors)
}
