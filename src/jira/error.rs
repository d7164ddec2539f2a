//! Domain errors for the Jira token lifecycle and data-access layer.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors surfaced by the OAuth flow, client selection and query layers.
#[derive(Debug, Error)]
pub enum JiraError {
    /// The callback carried a state we did not produce. The callback is
    /// rejected without touching any record.
    #[error("invalid or malformed OAuth state")]
    InvalidState,

    /// Token exchange succeeded but the grant covers no Jira site.
    #[error("token grants access to no Jira site")]
    NoAccessibleResources,

    /// OAuth client credentials are missing. Operator error; the record is
    /// deliberately left untouched.
    #[error("OAuth client is not configured: {0}")]
    Configuration(String),

    /// A refresh failed against the provider; the record has been marked
    /// inactive and the user must re-link.
    #[error("integration requires re-authentication")]
    ReauthRequired,

    /// The user has no integration record.
    #[error("no Jira integration linked for this user")]
    NotLinked,

    /// Both client strategies failed their probe. May be transient provider
    /// downtime, so the record stays active.
    #[error("Jira is unreachable (primary: {primary}; fallback: {fallback})")]
    Unavailable { primary: String, fallback: String },

    /// The provider answered an auth-endpoint call with a non-2xx status.
    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    /// The provider rejected a specific data query (e.g. malformed JQL).
    #[error("query rejected by provider: {0}")]
    Query(String),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JiraError {
    /// Builds a provider error from a response status and body, truncating
    /// the body so upstream pages never flood the logs.
    pub fn provider(status: u16, body: String) -> Self {
        let body = if body.chars().count() > 200 {
            let truncated: String = body.chars().take(200).collect();
            format!("{}...", truncated)
        } else {
            body
        };
        Self::Provider { status, body }
    }
}
