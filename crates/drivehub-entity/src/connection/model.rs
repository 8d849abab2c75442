//! Cloud account connection entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::provider::CloudProvider;

/// OAuth credentials for one (user, provider) account pairing.
///
/// Created by the onboarding flow; the worker only refreshes the access
/// token and expiry in place.
#[derive(Clone, Serialize, Deserialize, FromRow)]
pub struct CloudConnection {
    /// Account identifier referenced by tasks.
    pub id: i64,
    /// Current bearer token.
    pub access_token: String,
    /// Long-lived refresh token (absent for client-credential providers).
    pub refresh_token: Option<String>,
    /// When the access token stops being valid (None = never recorded).
    pub expires_at: Option<DateTime<Utc>>,
    /// Owning user.
    pub user_id: i64,
    /// Account email address.
    pub email: String,
    /// Vendor of this account.
    pub provider: CloudProvider,
    /// Directory tenant (required for per-tenant identity providers).
    pub tenant_id: Option<String>,
    /// When the connection was created.
    pub created_at: DateTime<Utc>,
}

impl CloudConnection {
    /// Whether the access token must be treated as expired at `now`.
    ///
    /// `skew` moves the cut-off earlier so a token is not handed out
    /// moments before it lapses.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now + skew >= expires_at,
            None => false,
        }
    }

    /// Return the tenant ID if it is present and non-blank.
    pub fn tenant(&self) -> Option<&str> {
        self.tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for CloudConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("provider", &self.provider)
            .field("tenant_id", &self.tenant_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(expires_at: Option<DateTime<Utc>>) -> CloudConnection {
        CloudConnection {
            id: 7,
            access_token: "secret-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at,
            user_id: 1,
            email: "owner@example.com".to_string(),
            provider: CloudProvider::GoogleDrive,
            tenant_id: Some("  ".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_boundaries() {
        let now = Utc::now();
        assert!(!connection(None).is_expired(now, Duration::zero()));
        assert!(!connection(Some(now + Duration::minutes(5))).is_expired(now, Duration::zero()));
        assert!(connection(Some(now - Duration::seconds(1))).is_expired(now, Duration::zero()));
        assert!(connection(Some(now + Duration::seconds(30))).is_expired(now, Duration::minutes(1)));
    }

    #[test]
    fn test_blank_tenant_is_absent() {
        assert_eq!(connection(None).tenant(), None);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", connection(None));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("owner@example.com"));
    }
}
