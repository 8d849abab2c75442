//! # drivehub-storage
//!
//! The operation executor contract the task dispatcher calls into, the
//! credential lifecycle policy shared by every executor, and the Google
//! Drive, Dropbox and OneDrive executors.

pub mod credentials;
pub mod executor;
mod http;
pub mod providers;

pub use credentials::{CredentialManager, RefreshedToken, TokenRefresher};
pub use executor::{OperationError, OperationExecutor};
