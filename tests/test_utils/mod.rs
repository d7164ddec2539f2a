//! Test utilities for database and service setup.
//!
//! Provides in-memory SQLite databases with migrations applied, plus
//! factories for the configuration and service stack pointed at a
//! wiremock server.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use jiralink::config::AppConfig;
use jiralink::crypto::CryptoKey;
use jiralink::jira::{DashboardService, JiraClientFactory, JiraOAuthService};
use jiralink::migration::{Migrator, MigratorTrait};
use jiralink::models::integration;
use jiralink::repositories::integration::{IntegrationRepository, LinkedTokens};
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[allow(dead_code)]
pub const TEST_OPERATOR_TOKEN: &str = "test-operator-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// 32-byte key used across tests; value is arbitrary.
pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("test key must be 32 bytes")
}

/// Config pointing both the OAuth and API bases at a mock server.
pub fn test_config(mock_uri: &str) -> Arc<AppConfig> {
    Arc::new(AppConfig {
        operator_tokens: vec![TEST_OPERATOR_TOKEN.to_string()],
        crypto_key: Some(vec![7u8; 32]),
        jira_client_id: Some("test-client-id".to_string()),
        jira_client_secret: Some("test-client-secret".to_string()),
        jira_redirect_uri: Some(format!("{}/integrations/jira/callback", mock_uri)),
        jira_oauth_base: mock_uri.to_string(),
        jira_api_base: mock_uri.to_string(),
        frontend_base_url: "http://localhost:3000".to_string(),
        ..Default::default()
    })
}

#[allow(dead_code)]
pub struct TestServices {
    pub repo: IntegrationRepository,
    pub oauth: JiraOAuthService,
    pub factory: JiraClientFactory,
    pub dashboard: DashboardService,
}

/// Builds the full service stack over the given database and config.
pub fn build_services(db: &DatabaseConnection, config: Arc<AppConfig>) -> TestServices {
    let repo = IntegrationRepository::new(Arc::new(db.clone()), test_crypto_key());
    let oauth = JiraOAuthService::new(Arc::clone(&config), repo.clone())
        .expect("oauth service construction");
    let factory = JiraClientFactory::new(config, repo.clone(), oauth.clone())
        .expect("client factory construction");
    let dashboard = DashboardService::new(factory.clone(), repo.clone());

    TestServices {
        repo,
        oauth,
        factory,
        dashboard,
    }
}

/// Inserts a linked integration whose site points at `site_url` and whose
/// access token expires at `expires_at`.
#[allow(dead_code)]
pub async fn link_integration(
    repo: &IntegrationRepository,
    user_id: &Uuid,
    site_url: &str,
    expires_at: DateTime<Utc>,
) -> Result<integration::Model> {
    repo.upsert_linked(
        user_id,
        LinkedTokens {
            access_token: "test_access_token".to_string(),
            refresh_token: "test_refresh_token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at,
            cloud_id: "cloud-123".to_string(),
            site_url: site_url.to_string(),
            site_name: "Example Site".to_string(),
        },
    )
    .await
}
