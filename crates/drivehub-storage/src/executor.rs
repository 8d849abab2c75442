//! Operation executor contract.

use async_trait::async_trait;
use thiserror::Error;

use drivehub_entity::connection::CloudProvider;
use drivehub_entity::task::{OperationKind, Task};

/// Why a cloud operation did not succeed.
///
/// Every variant ends the task as `FAILED`; the display text becomes the
/// task's error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The vendor API rejected the request.
    #[error("{provider} API error (HTTP {status}): {message}")]
    Provider {
        /// Vendor that answered.
        provider: CloudProvider,
        /// HTTP status code.
        status: u16,
        /// Vendor-supplied reason.
        message: String,
    },

    /// No executor handles this operation/provider pair.
    #[error("Unsupported operation {kind} for provider {provider}")]
    Unsupported {
        /// Requested operation.
        kind: OperationKind,
        /// Requested provider.
        provider: CloudProvider,
    },

    /// The task is missing data the operation needs.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// The referenced cloud account does not exist.
    #[error("Account not found for ID: {0}")]
    AccountNotFound(i64),

    /// A valid access token could not be obtained.
    #[error("Credential error for account {account_id}: {message}")]
    Credentials {
        /// Account whose token was requested.
        account_id: i64,
        /// Reason.
        message: String,
    },

    /// Network failure or an unreadable response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection store failed while resolving credentials.
    #[error("Store error: {0}")]
    Store(String),

    /// The executor panicked.
    #[error("Executor panicked: {0}")]
    Panicked(String),
}

/// Performs file operations against one cloud vendor.
///
/// Implementations own authentication (including token refresh) and any
/// retries; the dispatcher never retries.
#[async_trait]
pub trait OperationExecutor: Send + Sync + std::fmt::Debug + 'static {
    /// The vendor this executor talks to.
    fn provider(&self) -> CloudProvider;

    /// Copy the task's source into its destination account.
    async fn copy(&self, task: &Task) -> Result<(), OperationError>;

    /// Delete `path` from the given account.
    async fn delete_by_account(&self, path: &str, account_id: i64) -> Result<(), OperationError>;
}
