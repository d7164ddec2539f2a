//! Atlassian OAuth 2.0 authorization-code flow and token lifecycle.
//!
//! Owns state generation and validation, the code exchange, site discovery
//! via accessible-resources, token refresh and the disconnect path. Token
//! plaintext only ever lives on the stack here; persistence goes through
//! the repository, which seals it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::jira::error::JiraError;
use crate::jira::types::{AccessibleResource, TokenResponse};
use crate::models::integration::{self, IntegrationStatus};
use crate::repositories::integration::{IntegrationRepository, LinkedTokens};

/// Scopes requested at consent time. `offline_access` is what makes the
/// provider return a refresh token.
pub const SCOPES: [&str; 9] = [
    "read:jira-work",
    "read:jira-user",
    "write:jira-work",
    "read:board-scope:jira-software",
    "read:project:jira",
    "read:sprint:jira-software",
    "read:issue-details:jira",
    "read:jql:jira",
    "offline_access",
];

const OAUTH_AUDIENCE: &str = "api.atlassian.com";
const STATE_NONCE_LEN: usize = 16;
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// CSRF state round-tripped through the provider's consent screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    pub user_id: Uuid,
    pub nonce: String,
}

/// Encodes the callback state: a JSON document carrying the initiating user
/// and a random nonce, base64url-encoded for URL transport.
pub fn encode_state(user_id: &Uuid) -> Result<String, JiraError> {
    let mut nonce_bytes = [0u8; STATE_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let state = StateData {
        user_id: *user_id,
        nonce: base64_url::encode(&nonce_bytes),
    };
    let json = serde_json::to_vec(&state)
        .map_err(|e| JiraError::Internal(anyhow::anyhow!("state serialization failed: {}", e)))?;

    Ok(base64_url::encode(&json))
}

/// Decodes and validates a callback state. Any malformed input, from
/// invalid base64 to a short nonce, yields `None`; the caller rejects the
/// callback without distinguishing the failure mode.
pub fn decode_state(raw: &str) -> Option<StateData> {
    let json = base64_url::decode(raw).ok()?;
    let state: StateData = serde_json::from_slice(&json).ok()?;

    let nonce = base64_url::decode(&state.nonce).ok()?;
    if nonce.len() < STATE_NONCE_LEN {
        return None;
    }

    Some(state)
}

/// Service driving the OAuth flow against Atlassian and persisting the
/// resulting link through the repository.
#[derive(Debug, Clone)]
pub struct JiraOAuthService {
    config: Arc<AppConfig>,
    repo: IntegrationRepository,
    http: reqwest::Client,
}

impl JiraOAuthService {
    pub fn new(config: Arc<AppConfig>, repo: IntegrationRepository) -> Result<Self, JiraError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        Ok(Self { config, repo, http })
    }

    fn client_credentials(&self) -> Result<(&str, &str), JiraError> {
        let client_id = self
            .config
            .jira_client_id
            .as_deref()
            .ok_or_else(|| JiraError::Configuration("JIRA_CLIENT_ID is not set".to_string()))?;
        let client_secret = self
            .config
            .jira_client_secret
            .as_deref()
            .ok_or_else(|| JiraError::Configuration("JIRA_CLIENT_SECRET is not set".to_string()))?;
        Ok((client_id, client_secret))
    }

    fn redirect_uri(&self) -> Result<&str, JiraError> {
        self.config
            .jira_redirect_uri
            .as_deref()
            .ok_or_else(|| JiraError::Configuration("JIRA_REDIRECT_URI is not set".to_string()))
    }

    /// Builds the authorization URL the frontend redirects the user to.
    pub fn begin_authorization(&self, user_id: &Uuid) -> Result<String, JiraError> {
        let (client_id, _) = self.client_credentials()?;
        let redirect_uri = self.redirect_uri()?;
        let state = encode_state(user_id)?;

        let mut url = Url::parse(&format!("{}/authorize", self.config.jira_oauth_base))
            .map_err(|e| JiraError::Configuration(format!("invalid OAuth base URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("audience", OAUTH_AUDIENCE)
            .append_pair("client_id", client_id)
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state)
            .append_pair("response_type", "code")
            .append_pair("prompt", "consent");

        tracing::info!(user_id = %user_id, "Built Jira authorization URL");
        Ok(url.to_string())
    }

    /// Handles the provider callback: validates state, exchanges the code,
    /// discovers the granted site and upserts the integration record.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<integration::Model, JiraError> {
        let state = decode_state(state).ok_or(JiraError::InvalidState)?;

        let token = self.exchange_code(code).await?;
        let resources = self.fetch_accessible_resources(&token.access_token).await?;
        let site = resources
            .into_iter()
            .next()
            .ok_or(JiraError::NoAccessibleResources)?;

        let expires_at = expires_at_from(Utc::now(), token.expires_in);
        let model = self
            .repo
            .upsert_linked(
                &state.user_id,
                LinkedTokens {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token.unwrap_or_default(),
                    token_type: token.token_type.unwrap_or_else(|| "Bearer".to_string()),
                    expires_at,
                    cloud_id: site.id,
                    site_url: site.url,
                    site_name: site.name,
                },
            )
            .await?;

        tracing::info!(
            user_id = %model.user_id,
            integration_id = %model.id,
            site_url = %model.site_url,
            "Jira integration linked"
        );
        Ok(model)
    }

    /// Exchanges the authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, JiraError> {
        let (client_id, client_secret) = self.client_credentials()?;
        let redirect_uri = self.redirect_uri()?;

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http
            .post(format!("{}/oauth/token", self.config.jira_oauth_base))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status, "Jira code exchange rejected");
            return Err(JiraError::provider(status, body));
        }

        Ok(response.json().await?)
    }

    /// Lists the Jira sites the granted token can reach.
    async fn fetch_accessible_resources(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessibleResource>, JiraError> {
        let response = self
            .http
            .get(format!(
                "{}/oauth/token/accessible-resources",
                self.config.jira_api_base
            ))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(JiraError::provider(status, body));
        }

        Ok(response.json().await?)
    }

    /// Refreshes the access token of an integration.
    ///
    /// A provider-side refusal marks the record inactive and reports
    /// [`JiraError::ReauthRequired`]; missing client credentials are an
    /// operator problem and leave the record untouched.
    pub async fn refresh(
        &self,
        integration: &integration::Model,
    ) -> Result<integration::Model, JiraError> {
        let (client_id, client_secret) = self.client_credentials()?;
        let (_, refresh_token) = self.repo.open_tokens(integration)?;

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", &refresh_token),
        ];

        let response = self
            .http
            .post(format!("{}/oauth/token", self.config.jira_oauth_base))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(
                user_id = %integration.user_id,
                integration_id = %integration.id,
                status = status,
                "Token refresh rejected; marking integration inactive"
            );
            self.repo.mark_inactive(&integration.id).await?;
            return Err(JiraError::ReauthRequired);
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = expires_at_from(Utc::now(), token.expires_in);
        // Atlassian rotates refresh tokens; fall back to the old one if the
        // response omits it.
        let new_refresh = token.refresh_token.unwrap_or(refresh_token);

        let updated = self
            .repo
            .update_tokens(
                &integration.id,
                &token.access_token,
                &new_refresh,
                expires_at,
            )
            .await?;

        tracing::info!(
            user_id = %updated.user_id,
            integration_id = %updated.id,
            expires_at = %updated.expires_at,
            "Access token refreshed"
        );
        Ok(updated)
    }

    /// Removes the user's integration; returns whether one existed.
    pub async fn disconnect(&self, user_id: &Uuid) -> Result<bool, JiraError> {
        let removed = self.repo.delete_by_user(user_id).await?;
        if removed {
            tracing::info!(user_id = %user_id, "Jira integration disconnected");
        }
        Ok(removed)
    }

    /// Connection status for the user, linked or not.
    pub async fn status(&self, user_id: &Uuid) -> Result<Option<IntegrationStatus>, JiraError> {
        Ok(self
            .repo
            .find_by_user(user_id)
            .await?
            .as_ref()
            .map(IntegrationStatus::from))
    }
}

fn expires_at_from(now: DateTime<Utc>, expires_in: Option<i64>) -> DateTime<Utc> {
    now + Duration::seconds(expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_roundtrip_preserves_user() {
        let user_id = Uuid::new_v4();
        let encoded = encode_state(&user_id).unwrap();
        let decoded = decode_state(&encoded).unwrap();
        assert_eq!(decoded.user_id, user_id);
    }

    #[test]
    fn state_nonces_are_unique() {
        let user_id = Uuid::new_v4();
        let a = decode_state(&encode_state(&user_id).unwrap()).unwrap();
        let b = decode_state(&encode_state(&user_id).unwrap()).unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn malformed_state_is_rejected() {
        assert!(decode_state("").is_none());
        assert!(decode_state("not base64url !!!").is_none());
        assert!(decode_state(&base64_url::encode(b"{\"user_id\": 7}")).is_none());
    }

    #[test]
    fn corrupted_state_is_rejected() {
        let encoded = encode_state(&Uuid::new_v4()).unwrap();
        let mut bytes = encoded.into_bytes();
        // Flip a character in the middle of the payload.
        let mid = bytes.len() / 2;
        bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(decode_state(&corrupted).is_none());
    }

    #[test]
    fn short_nonce_is_rejected() {
        let state = StateData {
            user_id: Uuid::new_v4(),
            nonce: base64_url::encode(b"short"),
        };
        let encoded = base64_url::encode(&serde_json::to_vec(&state).unwrap());
        assert!(decode_state(&encoded).is_none());
    }

    #[test]
    fn expires_at_defaults_to_one_hour() {
        let now = Utc::now();
        assert_eq!(expires_at_from(now, None), now + Duration::seconds(3600));
        assert_eq!(expires_at_from(now, Some(600)), now + Duration::seconds(600));
    }
}
