//! Payload types for the Atlassian OAuth and Jira REST APIs.
//!
//! List-style responses from Jira arrive either as a bare JSON array or as
//! an envelope object with a `values` field, depending on endpoint and
//! deployment. [`Listing`] absorbs both shapes at the client boundary so
//! the rest of the crate only ever sees plain vectors.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Token endpoint response for both the authorization-code and refresh grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds; Atlassian omits it on some grants.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// One entry of the accessible-resources response: a Jira site the granted
/// token can reach.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessibleResource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
}

/// A Jira project.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type_key: Option<String>,
}

/// The authenticated Jira user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(default)]
    pub account_id: Option<String>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

/// Issue status with its category ("To Do", "In Progress", "Done").
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_category: Option<StatusCategory>,
}

/// Status category bucket.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCategory {
    pub name: String,
}

/// The issue fields this service reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// Story point estimate; site-specific custom field.
    #[serde(
        default,
        rename = "customfield_10016",
        skip_serializing_if = "Option::is_none"
    )]
    pub story_points: Option<f64>,
}

/// A Jira issue.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Issue {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

/// JQL search result page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub total: i64,
}

/// An agile board.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub board_type: Option<String>,
}

/// A sprint on an agile board.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_date: Option<String>,
}

/// Either a bare array or a `{"values": [...]}` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Envelope { values: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    /// Normalize both response shapes to a plain vector.
    pub fn into_values(self) -> Vec<T> {
        match self {
            Listing::Envelope { values } => values,
            Listing::Bare(values) => values,
        }
    }
}
