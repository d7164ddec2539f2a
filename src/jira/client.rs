//! Jira REST clients and working-client selection.
//!
//! Two strategies reach a linked site: a direct client against the site's
//! own URL, and a gateway client routed through the Atlassian cloud gateway
//! by cloud id. [`JiraClientFactory`] refreshes tokens when they are close
//! to expiry, probes the direct strategy with a current-user call and falls
//! back to the gateway before giving up.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::jira::error::JiraError;
use crate::jira::oauth::JiraOAuthService;
use crate::jira::types::{Board, Issue, Listing, Project, SearchResult, Sprint, UserIdentity};
use crate::models::integration;
use crate::repositories::integration::IntegrationRepository;

/// Tokens expiring within this window are refreshed before any live call.
const REFRESH_WINDOW_MINUTES: i64 = 5;

const API_PATH: &str = "rest/api/2";
const AGILE_PATH: &str = "rest/agile/1.0";

/// Read operations the rest of the crate performs against a Jira site.
#[async_trait]
pub trait JiraApi: Send + Sync {
    /// The user the access token belongs to. Doubles as the liveness probe.
    async fn current_user(&self) -> Result<UserIdentity, JiraError>;

    async fn list_projects(&self) -> Result<Vec<Project>, JiraError>;

    async fn search_issues(&self, jql: &str, limit: u32) -> Result<SearchResult, JiraError>;

    async fn list_boards(&self, project_key: Option<&str>) -> Result<Vec<Board>, JiraError>;

    async fn list_sprints(
        &self,
        board_id: i64,
        state: Option<&str>,
    ) -> Result<Vec<Sprint>, JiraError>;

    async fn list_sprint_issues(&self, sprint_id: i64) -> Result<Vec<Issue>, JiraError>;
}

/// Bearer-authenticated REST client bound to one base URL.
#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    strategy: &'static str,
}

impl JiraClient {
    /// Client talking directly to the linked site.
    pub fn for_site(http: reqwest::Client, site_url: &str, access_token: String) -> Self {
        Self {
            http,
            base_url: site_url.trim_end_matches('/').to_string(),
            access_token,
            strategy: "site",
        }
    }

    /// Client routed through the Atlassian cloud gateway by cloud id.
    pub fn for_gateway(
        http: reqwest::Client,
        api_base: &str,
        cloud_id: &str,
        access_token: String,
    ) -> Self {
        Self {
            http,
            base_url: format!("{}/ex/jira/{}", api_base.trim_end_matches('/'), cloud_id),
            access_token,
            strategy: "gateway",
        }
    }

    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, JiraError> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 400 means the provider understood us and rejected the query
            // itself, typically malformed JQL.
            if status.as_u16() == 400 {
                let snippet: String = body.chars().take(200).collect();
                return Err(JiraError::Query(snippet));
            }
            return Err(JiraError::provider(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl JiraApi for JiraClient {
    async fn current_user(&self) -> Result<UserIdentity, JiraError> {
        self.get_json(&format!("{}/myself", API_PATH), &[]).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, JiraError> {
        let listing: Listing<Project> = self.get_json(&format!("{}/project", API_PATH), &[]).await?;
        Ok(listing.into_values())
    }

    async fn search_issues(&self, jql: &str, limit: u32) -> Result<SearchResult, JiraError> {
        self.get_json(
            &format!("{}/search", API_PATH),
            &[
                ("jql", jql.to_string()),
                ("maxResults", limit.to_string()),
            ],
        )
        .await
    }

    async fn list_boards(&self, project_key: Option<&str>) -> Result<Vec<Board>, JiraError> {
        let mut query = Vec::new();
        if let Some(key) = project_key {
            query.push(("projectKeyOrId", key.to_string()));
        }
        let listing: Listing<Board> = self
            .get_json(&format!("{}/board", AGILE_PATH), &query)
            .await?;
        Ok(listing.into_values())
    }

    async fn list_sprints(
        &self,
        board_id: i64,
        state: Option<&str>,
    ) -> Result<Vec<Sprint>, JiraError> {
        let mut query = Vec::new();
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }
        let listing: Listing<Sprint> = self
            .get_json(&format!("{}/board/{}/sprint", AGILE_PATH, board_id), &query)
            .await?;
        Ok(listing.into_values())
    }

    async fn list_sprint_issues(&self, sprint_id: i64) -> Result<Vec<Issue>, JiraError> {
        let result: SearchResult = self
            .get_json(&format!("{}/sprint/{}/issue", AGILE_PATH, sprint_id), &[])
            .await?;
        Ok(result.issues)
    }
}

/// Selects a working client for a linked integration.
#[derive(Debug, Clone)]
pub struct JiraClientFactory {
    config: Arc<AppConfig>,
    repo: IntegrationRepository,
    oauth: JiraOAuthService,
    http: reqwest::Client,
}

impl JiraClientFactory {
    pub fn new(
        config: Arc<AppConfig>,
        repo: IntegrationRepository,
        oauth: JiraOAuthService,
    ) -> Result<Self, JiraError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            repo,
            oauth,
            http,
        })
    }

    /// Looks up the user's integration and hands back a probed client.
    pub async fn client_for_user(
        &self,
        user_id: &Uuid,
    ) -> Result<(JiraClient, integration::Model), JiraError> {
        let integration = self
            .repo
            .find_by_user(user_id)
            .await?
            .ok_or(JiraError::NotLinked)?;
        self.get_client(integration).await
    }

    /// Produces a client that has answered a current-user probe, refreshing
    /// the token first when it is inside the expiry window.
    ///
    /// Returns the possibly-refreshed integration record alongside the
    /// client so callers see the current expiry.
    pub async fn get_client(
        &self,
        integration: integration::Model,
    ) -> Result<(JiraClient, integration::Model), JiraError> {
        if !integration.is_active {
            tracing::warn!(
                user_id = %integration.user_id,
                integration_id = %integration.id,
                "Integration is inactive; re-authentication required"
            );
            return Err(JiraError::ReauthRequired);
        }
        if integration.has_outdated_scopes() {
            tracing::warn!(
                user_id = %integration.user_id,
                integration_id = %integration.id,
                scopes_version = integration.scopes_version,
                "Integration scopes are outdated; re-authentication required"
            );
            return Err(JiraError::ReauthRequired);
        }

        let integration = if integration.time_until_expiry()
            < Duration::minutes(REFRESH_WINDOW_MINUTES)
        {
            tracing::info!(
                user_id = %integration.user_id,
                integration_id = %integration.id,
                "Access token inside refresh window; refreshing"
            );
            self.oauth.refresh(&integration).await?
        } else {
            integration
        };

        let (access_token, _) = self.repo.open_tokens(&integration)?;

        let primary = JiraClient::for_site(self.http.clone(), &integration.site_url, access_token.clone());
        let primary_err = match primary.current_user().await {
            Ok(_) => {
                tracing::debug!(
                    user_id = %integration.user_id,
                    integration_id = %integration.id,
                    strategy = primary.strategy(),
                    "Client probe succeeded"
                );
                return Ok((primary, integration));
            }
            Err(e) => e,
        };

        tracing::warn!(
            user_id = %integration.user_id,
            integration_id = %integration.id,
            error = %primary_err,
            "Direct site client failed probe; trying cloud gateway"
        );

        let fallback = JiraClient::for_gateway(
            self.http.clone(),
            &self.config.jira_api_base,
            &integration.cloud_id,
            access_token,
        );
        match fallback.current_user().await {
            Ok(_) => {
                tracing::info!(
                    user_id = %integration.user_id,
                    integration_id = %integration.id,
                    strategy = fallback.strategy(),
                    "Fell back to cloud gateway client"
                );
                Ok((fallback, integration))
            }
            Err(fallback_err) => {
                tracing::error!(
                    user_id = %integration.user_id,
                    integration_id = %integration.id,
                    primary_error = %primary_err,
                    fallback_error = %fallback_err,
                    "Both client strategies failed probe"
                );
                Err(JiraError::Unavailable {
                    primary: primary_err.to_string(),
                    fallback: fallback_err.to_string(),
                })
            }
        }
    }
}
