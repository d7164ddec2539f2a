//! Handlers for the Jira integration surface.
//!
//! All routes except the OAuth callback sit behind operator auth and an
//! `X-User-Id` header; the callback is public because the provider calls
//! it, and it answers with a frontend redirect rather than JSON.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::UserExtension;
use crate::error::{ApiError, validation_error};
use crate::jira::client::JiraApi;
use crate::jira::dashboard::DashboardSnapshot;
use crate::jira::types::{Board, Issue, Project, SearchResult, Sprint, UserIdentity};
use crate::jira::{DashboardService, JiraClientFactory, JiraOAuthService};
use crate::models::integration::IntegrationStatus;
use crate::repositories::IntegrationRepository;
use crate::server::AppState;

const SEARCH_LIMIT_MAX: u32 = 50;
const MY_ISSUES_LIMIT_DEFAULT: u32 = 20;
const MY_ISSUES_LIMIT_MAX: u32 = 100;

struct Services {
    repo: IntegrationRepository,
    oauth: JiraOAuthService,
    factory: JiraClientFactory,
    dashboard: DashboardService,
}

fn services(state: &AppState) -> Result<Services, ApiError> {
    let repo = IntegrationRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let oauth = JiraOAuthService::new(Arc::clone(&state.config), repo.clone())?;
    let factory =
        JiraClientFactory::new(Arc::clone(&state.config), repo.clone(), oauth.clone())?;
    let dashboard = DashboardService::new(factory.clone(), repo.clone());

    Ok(Services {
        repo,
        oauth,
        factory,
        dashboard,
    })
}

/// Response for a started authorization flow
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectResponse {
    /// URL the frontend should redirect the user to
    pub authorization_url: String,
}

/// Query parameters delivered by the provider callback
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied consent
    pub error: Option<String>,
}

/// Query parameters for raw JQL search
#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    pub jql: Option<String>,
    pub limit: Option<u32>,
}

/// Query parameters for the current user's open issues
#[derive(Debug, Deserialize, IntoParams)]
pub struct MyIssuesQuery {
    pub limit: Option<u32>,
}

/// Query parameters for board listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct BoardsQuery {
    pub project_key: Option<String>,
}

/// Query parameters for sprint listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct SprintsQuery {
    /// Filter by sprint state ("active", "closed", "future")
    pub state: Option<String>,
}

/// Connection status for the requesting user
#[utoipa::path(
    get,
    path = "/integrations/jira",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Integration status", body = IntegrationStatus),
        (status = 404, description = "No integration linked", body = IntegrationStatus),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn status(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Response, ApiError> {
    let services = services(&state)?;

    match services.oauth.status(&user.0).await? {
        Some(status) => Ok(Json(status).into_response()),
        None => Ok((StatusCode::NOT_FOUND, Json(IntegrationStatus::unlinked())).into_response()),
    }
}

/// Starts the OAuth authorization flow
#[utoipa::path(
    post,
    path = "/integrations/jira/connect",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Authorization URL built", body = ConnectResponse),
        (status = 500, description = "OAuth client not configured", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn connect(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<ConnectResponse>, ApiError> {
    let services = services(&state)?;
    let authorization_url = services.oauth.begin_authorization(&user.0)?;

    Ok(Json(ConnectResponse { authorization_url }))
}

/// OAuth callback hit by the provider after consent.
///
/// Always redirects to the frontend; the query flag tells the frontend
/// whether the link completed. Failures are logged here and never leak
/// into the redirect.
#[utoipa::path(
    get,
    path = "/integrations/jira/callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to the frontend integrations page")
    ),
    tag = "integrations"
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let outcome = handle_callback(&state, query).await;

    let flag = match outcome {
        Ok(()) => "success",
        Err(e) => {
            tracing::warn!(code = %e.code, message = %e.message, "Jira OAuth callback failed");
            "error"
        }
    };

    Redirect::to(&format!(
        "{}/integrations?jira_connected={}",
        state.config.frontend_base_url.trim_end_matches('/'),
        flag
    ))
}

async fn handle_callback(state: &AppState, query: CallbackQuery) -> Result<(), ApiError> {
    if let Some(error) = query.error {
        tracing::warn!(provider_error = %error, "Consent denied or provider error");
        return Err(validation_error(
            "Authorization was not granted",
            serde_json::json!({ "error": error }),
        ));
    }

    let code = query.code.ok_or_else(|| {
        validation_error(
            "Missing callback parameter",
            serde_json::json!({ "code": "Required parameter is missing" }),
        )
    })?;
    let callback_state = query.state.ok_or_else(|| {
        validation_error(
            "Missing callback parameter",
            serde_json::json!({ "state": "Required parameter is missing" }),
        )
    })?;

    let services = services(state)?;
    services.oauth.handle_callback(&code, &callback_state).await?;

    Ok(())
}

/// Removes the user's Jira integration
#[utoipa::path(
    delete,
    path = "/integrations/jira",
    params(crate::auth::UserHeader),
    responses(
        (status = 204, description = "Integration removed"),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<StatusCode, ApiError> {
    let services = services(&state)?;

    if services.oauth.disconnect(&user.0).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(crate::jira::JiraError::NotLinked.into())
    }
}

/// Lists the projects of the linked site
#[utoipa::path(
    get,
    path = "/integrations/jira/projects",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Projects of the linked site", body = [Project]),
        (status = 400, description = "Integration is inactive", body = ApiError),
        (status = 404, description = "No integration linked", body = ApiError),
        (status = 502, description = "Jira unreachable", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn projects(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<Vec<Project>>, ApiError> {
    let services = services(&state)?;

    let integration = services
        .repo
        .find_by_user(&user.0)
        .await
        .map_err(ApiError::from)?
        .ok_or(crate::jira::JiraError::NotLinked)?;
    if !integration.is_active {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "INTEGRATION_INACTIVE",
            "Jira integration is inactive; re-link to continue",
        ));
    }

    let projects = services.dashboard.get_projects(&user.0).await?;
    Ok(Json(projects))
}

/// Aggregated dashboard snapshot
#[utoipa::path(
    get,
    path = "/integrations/jira/dashboard",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Dashboard snapshot", body = DashboardSnapshot),
        (status = 401, description = "Re-authentication required", body = ApiError),
        (status = 404, description = "No integration linked", body = ApiError),
        (status = 502, description = "Jira unreachable", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<DashboardSnapshot>, ApiError> {
    let services = services(&state)?;
    let snapshot = services.dashboard.get_dashboard_data(&user.0).await?;

    Ok(Json(snapshot))
}

/// The Jira identity behind the linked token
#[utoipa::path(
    get,
    path = "/integrations/jira/myself",
    params(crate::auth::UserHeader),
    responses(
        (status = 200, description = "Current Jira user", body = UserIdentity),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn myself(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
) -> Result<Json<UserIdentity>, ApiError> {
    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;
    let identity = client.current_user().await?;

    Ok(Json(identity))
}

/// Raw JQL search against the linked site
#[utoipa::path(
    get,
    path = "/integrations/jira/search",
    params(crate::auth::UserHeader, SearchQuery),
    responses(
        (status = 200, description = "Search result page", body = SearchResult),
        (status = 400, description = "Missing JQL", body = ApiError),
        (status = 502, description = "Query rejected upstream", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn search(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResult>, ApiError> {
    let jql = query
        .jql
        .filter(|jql| !jql.trim().is_empty())
        .ok_or_else(|| {
            validation_error(
                "Missing query parameter",
                serde_json::json!({ "jql": "Required parameter is missing" }),
            )
        })?;
    let limit = query
        .limit
        .unwrap_or(SEARCH_LIMIT_MAX)
        .clamp(1, SEARCH_LIMIT_MAX);

    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;
    let result = client.search_issues(&jql, limit).await?;

    Ok(Json(result))
}

/// The requesting user's open issues
#[utoipa::path(
    get,
    path = "/integrations/jira/issues/mine",
    params(crate::auth::UserHeader, MyIssuesQuery),
    responses(
        (status = 200, description = "Open issues assigned to the user", body = SearchResult),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn my_issues(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(query): Query<MyIssuesQuery>,
) -> Result<Json<SearchResult>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(MY_ISSUES_LIMIT_DEFAULT)
        .clamp(1, MY_ISSUES_LIMIT_MAX);

    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;

    let identity = client.current_user().await?;
    let jql = match identity.email_address.as_deref() {
        Some(email) => format!("assignee = \"{}\" AND status != Done", email),
        None => "assignee = currentUser() AND status != Done".to_string(),
    };

    let result = client.search_issues(&jql, limit).await?;
    Ok(Json(result))
}

/// Lists agile boards, optionally scoped to a project
#[utoipa::path(
    get,
    path = "/integrations/jira/boards",
    params(crate::auth::UserHeader, BoardsQuery),
    responses(
        (status = 200, description = "Agile boards", body = [Board]),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn boards(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Query(query): Query<BoardsQuery>,
) -> Result<Json<Vec<Board>>, ApiError> {
    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;
    let boards = client.list_boards(query.project_key.as_deref()).await?;

    Ok(Json(boards))
}

/// Lists the sprints of a board
#[utoipa::path(
    get,
    path = "/integrations/jira/boards/{board_id}/sprints",
    params(
        crate::auth::UserHeader,
        SprintsQuery,
        ("board_id" = i64, Path, description = "Agile board identifier")
    ),
    responses(
        (status = 200, description = "Sprints of the board", body = [Sprint]),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn sprints(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(board_id): Path<i64>,
    Query(query): Query<SprintsQuery>,
) -> Result<Json<Vec<Sprint>>, ApiError> {
    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;
    let sprints = client.list_sprints(board_id, query.state.as_deref()).await?;

    Ok(Json(sprints))
}

/// Lists the issues of a sprint
#[utoipa::path(
    get,
    path = "/integrations/jira/sprints/{sprint_id}/issues",
    params(
        crate::auth::UserHeader,
        ("sprint_id" = i64, Path, description = "Sprint identifier")
    ),
    responses(
        (status = 200, description = "Issues of the sprint", body = [Issue]),
        (status = 404, description = "No integration linked", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn sprint_issues(
    State(state): State<AppState>,
    UserExtension(user): UserExtension,
    Path(sprint_id): Path<i64>,
) -> Result<Json<Vec<Issue>>, ApiError> {
    let services = services(&state)?;
    let (client, _) = services.factory.client_for_user(&user.0).await?;
    let issues = client.list_sprint_issues(sprint_id).await?;

    Ok(Json(issues))
}
