//! Cloud storage vendor enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The cloud storage vendor a task or connection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cloud_provider")]
pub enum CloudProvider {
    /// Google Drive.
    #[sqlx(rename = "GOOGLE_DRIVE")]
    #[serde(rename = "GOOGLE_DRIVE")]
    GoogleDrive,
    /// Dropbox.
    #[sqlx(rename = "DROPBOX")]
    #[serde(rename = "DROPBOX")]
    Dropbox,
    /// Microsoft OneDrive.
    #[sqlx(rename = "ONEDRIVE")]
    #[serde(rename = "ONEDRIVE")]
    OneDrive,
}

impl CloudProvider {
    /// Return the provider as its stored string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleDrive => "GOOGLE_DRIVE",
            Self::Dropbox => "DROPBOX",
            Self::OneDrive => "ONEDRIVE",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = drivehub_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GOOGLE_DRIVE" => Ok(Self::GoogleDrive),
            "DROPBOX" => Ok(Self::Dropbox),
            "ONEDRIVE" => Ok(Self::OneDrive),
            _ => Err(drivehub_core::AppError::validation(format!(
                "Invalid cloud provider: '{s}'. Expected one of: GOOGLE_DRIVE, DROPBOX, ONEDRIVE"
            ))),
        }
    }
}
