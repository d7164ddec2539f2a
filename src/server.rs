//! # Server Configuration
//!
//! This module contains the server setup and configuration for the jiralink API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::handlers::integrations;
use crate::telemetry::{TraceContext, with_trace_context};

/// Attaches a trace context to every request, honoring an inbound
/// `X-Trace-Id` header so gateway-assigned IDs survive into our logs.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = TraceContext { trace_id };
    request.extensions_mut().insert(context.clone());

    with_trace_context(context, next.run(request)).await
}

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/integrations/jira",
            get(integrations::status).delete(integrations::disconnect),
        )
        .route("/integrations/jira/connect", post(integrations::connect))
        .route("/integrations/jira/projects", get(integrations::projects))
        .route("/integrations/jira/dashboard", get(integrations::dashboard))
        .route("/integrations/jira/myself", get(integrations::myself))
        .route("/integrations/jira/search", get(integrations::search))
        .route("/integrations/jira/issues/mine", get(integrations::my_issues))
        .route("/integrations/jira/boards", get(integrations::boards))
        .route(
            "/integrations/jira/boards/{board_id}/sprints",
            get(integrations::sprints),
        )
        .route(
            "/integrations/jira/sprints/{sprint_id}/issues",
            get(integrations::sprint_issues),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        // The provider calls this one; it cannot carry operator auth.
        .route(
            "/integrations/jira/callback",
            get(integrations::callback),
        )
        .merge(protected)
        .with_state(state)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let crypto_key_bytes = config
        .crypto_key
        .clone()
        .ok_or("CRYPTO_KEY must be configured")?;
    let crypto_key = CryptoKey::new(crypto_key_bytes)?;

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState {
        config: Arc::new(config),
        db,
        crypto_key,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::integrations::status,
        crate::handlers::integrations::connect,
        crate::handlers::integrations::callback,
        crate::handlers::integrations::disconnect,
        crate::handlers::integrations::projects,
        crate::handlers::integrations::dashboard,
        crate::handlers::integrations::myself,
        crate::handlers::integrations::search,
        crate::handlers::integrations::my_issues,
        crate::handlers::integrations::boards,
        crate::handlers::integrations::sprints,
        crate::handlers::integrations::sprint_issues,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::error::ProviderErrorDetails,
            crate::auth::UserHeader,
            crate::models::integration::IntegrationStatus,
            crate::handlers::integrations::ConnectResponse,
            crate::jira::types::Project,
            crate::jira::types::UserIdentity,
            crate::jira::types::Status,
            crate::jira::types::StatusCategory,
            crate::jira::types::IssueFields,
            crate::jira::types::Issue,
            crate::jira::types::SearchResult,
            crate::jira::types::Board,
            crate::jira::types::Sprint,
            crate::jira::dashboard::DashboardSnapshot,
            crate::jira::dashboard::SprintProgress,
            crate::jira::dashboard::VelocityEntry,
            crate::jira::dashboard::DashboardStats,
        )
    ),
    info(
        title = "Jiralink API",
        description = "API for linking Jira Cloud accounts and reading Jira data",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
