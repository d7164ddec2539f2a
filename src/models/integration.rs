//! Jira integration entity model
//!
//! This module contains the SeaORM entity model for the jira_integrations
//! table, which stores one user's link to one Jira Cloud site together with
//! the sealed OAuth token pair.

use chrono::Utc;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Scopes version granted by the current consent screen. Records below this
/// version lack newly required permissions and must re-link.
pub const CURRENT_SCOPES_VERSION: i32 = 2;

/// Jira integration entity: one row per user, unique on `user_id`
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "jira_integrations")]
pub struct Model {
    /// Unique identifier for the integration (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user; exactly one integration may exist per user
    pub user_id: Uuid,

    /// Sealed access token (never exposed or logged in plaintext)
    pub access_token_ciphertext: String,

    /// Sealed refresh token (never exposed or logged in plaintext)
    pub refresh_token_ciphertext: String,

    /// Token scheme reported by the provider (normally "Bearer")
    pub token_type: String,

    /// Absolute expiry of the access token; the sole source of liveness truth
    pub expires_at: DateTimeWithTimeZone,

    /// Atlassian cloud identifier of the linked site
    pub cloud_id: String,

    /// Direct URL of the linked site
    pub site_url: String,

    /// Display name of the linked site
    pub site_name: String,

    /// False once a refresh has failed; the record must not be used for
    /// live calls until the user re-authenticates
    pub is_active: bool,

    /// Timestamp of the most recent successful data pull (advisory)
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// Which consent scope set was granted at link time
    pub scopes_version: i32,

    /// Timestamp when the integration was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the integration was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the access token has expired. Computed from `expires_at`
    /// on every call; `now == expires_at` counts as expired.
    pub fn is_token_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whether the granted scopes predate the currently required set.
    pub fn has_outdated_scopes(&self) -> bool {
        self.scopes_version < CURRENT_SCOPES_VERSION
    }

    /// Derived connection state; never stored.
    pub fn is_connected(&self) -> bool {
        self.is_active && !self.is_token_expired() && !self.has_outdated_scopes()
    }

    /// Whether the user must go through the authorization flow again.
    pub fn needs_reauth(&self) -> bool {
        self.is_token_expired() || self.has_outdated_scopes()
    }

    /// Time remaining until the access token expires (negative once past).
    pub fn time_until_expiry(&self) -> chrono::Duration {
        self.expires_at.signed_duration_since(Utc::now())
    }
}

/// Connection status payload exposed to the frontend
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IntegrationStatus {
    /// Whether the link is usable right now
    pub is_connected: bool,
    /// Whether the access token is past its expiry
    pub is_token_expired: bool,
    /// Whether the granted scopes are behind the required set
    pub has_outdated_scopes: bool,
    /// Whether the user must re-run the authorization flow
    pub needs_reauth: bool,
    /// URL of the linked site, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    /// Name of the linked site, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    /// Most recent successful data pull
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = String)]
    pub last_sync_at: Option<DateTimeWithTimeZone>,
}

impl IntegrationStatus {
    /// Status for a user with no integration record.
    pub fn unlinked() -> Self {
        Self {
            is_connected: false,
            is_token_expired: false,
            has_outdated_scopes: false,
            needs_reauth: false,
            site_url: None,
            site_name: None,
            last_sync_at: None,
        }
    }
}

impl From<&Model> for IntegrationStatus {
    fn from(model: &Model) -> Self {
        Self {
            is_connected: model.is_connected(),
            is_token_expired: model.is_token_expired(),
            has_outdated_scopes: model.has_outdated_scopes(),
            needs_reauth: model.needs_reauth(),
            site_url: Some(model.site_url.clone()),
            site_name: Some(model.site_name.clone()),
            last_sync_at: model.last_sync_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(expires_in: Duration, is_active: bool, scopes_version: i32) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            access_token_ciphertext: "sealed-access".to_string(),
            refresh_token_ciphertext: "sealed-refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: (now + expires_in).into(),
            cloud_id: "cloud-1".to_string(),
            site_url: "https://example.atlassian.net".to_string(),
            site_name: "Example".to_string(),
            is_active,
            last_sync_at: None,
            scopes_version,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[test]
    fn fresh_active_record_is_connected() {
        let model = sample(Duration::hours(1), true, CURRENT_SCOPES_VERSION);
        assert!(model.is_connected());
        assert!(!model.needs_reauth());
    }

    #[test]
    fn expiry_boundary_counts_as_expired() {
        let model = sample(Duration::zero(), true, CURRENT_SCOPES_VERSION);
        assert!(model.is_token_expired());
        assert!(!model.is_connected());
        assert!(model.needs_reauth());
    }

    #[test]
    fn outdated_scopes_need_reauth_even_when_fresh() {
        let model = sample(Duration::hours(1), true, CURRENT_SCOPES_VERSION - 1);
        assert!(model.has_outdated_scopes());
        assert!(!model.is_connected());
        assert!(model.needs_reauth());
    }

    #[test]
    fn inactive_record_is_not_connected() {
        let model = sample(Duration::hours(1), false, CURRENT_SCOPES_VERSION);
        assert!(!model.is_connected());
        // Not expired and scopes are current, so reauth is driven by is_active
        // only through the connect status, not needs_reauth itself.
        assert!(!model.needs_reauth());
    }

    #[test]
    fn status_for_missing_record_reports_not_connected() {
        let status = IntegrationStatus::unlinked();
        assert!(!status.is_connected);
        assert!(!status.needs_reauth);
        assert!(status.site_url.is_none());
    }
}
