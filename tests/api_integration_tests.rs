//! HTTP surface tests over the full router.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use jiralink::jira::oauth::encode_state;
use jiralink::server::{AppState, create_app};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

mod test_utils;
use test_utils::{
    TEST_OPERATOR_TOKEN, build_services, link_integration, setup_test_db, test_config,
    test_crypto_key,
};

async fn test_app(mock_uri: &str) -> (axum::Router, sea_orm::DatabaseConnection) {
    let db = setup_test_db().await.unwrap();
    let state = AppState {
        config: test_config(mock_uri),
        db: db.clone(),
        crypto_key: test_crypto_key(),
    };
    (create_app(state), db)
}

fn get(uri: &str, user_id: &Uuid) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {}", TEST_OPERATOR_TOKEN))
        .header("X-User-Id", user_id.to_string())
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_and_healthz_are_public() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "jiralink");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/integrations/jira")
                .header("X-User-Id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn status_for_unlinked_user_is_404_with_body() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let response = app
        .oneshot(get("/integrations/jira", &Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["is_connected"], false);
    assert_eq!(body["needs_reauth"], false);
}

#[tokio::test]
async fn status_for_linked_user_reports_connection() {
    let server = MockServer::start().await;
    let (app, db) = test_app(&server.uri()).await;
    let services = build_services(&db, test_config(&server.uri()));

    let user_id = Uuid::new_v4();
    link_integration(
        &services.repo,
        &user_id,
        "https://example.atlassian.net",
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();

    let response = app.oneshot(get("/integrations/jira", &user_id)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_connected"], true);
    assert_eq!(body["site_url"], "https://example.atlassian.net");
}

#[tokio::test]
async fn connect_returns_an_authorization_url() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/integrations/jira/connect")
        .header("Authorization", format!("Bearer {}", TEST_OPERATOR_TOKEN))
        .header("X-User-Id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let url = body["authorization_url"].as_str().unwrap();
    assert!(url.contains("/authorize?"));
    assert!(url.contains("response_type=code"));
    assert!(url.contains("state="));
}

#[tokio::test]
async fn callback_redirects_to_frontend_on_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "granted_access_token",
            "refresh_token": "granted_refresh_token",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oauth/token/accessible-resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "cloud-abc", "url": "https://example.atlassian.net", "name": "Example"}
        ])))
        .mount(&server)
        .await;

    let (app, db) = test_app(&server.uri()).await;

    let user_id = Uuid::new_v4();
    let state = encode_state(&user_id).unwrap();
    let uri = format!(
        "/integrations/jira/callback?code=test_code&state={}",
        state
    );

    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert_eq!(
        location,
        "http://localhost:3000/integrations?jira_connected=success"
    );

    let services = build_services(&db, test_config(&server.uri()));
    assert!(services.repo.find_by_user(&user_id).await.unwrap().is_some());
}

#[tokio::test]
async fn callback_redirects_with_error_flag_on_bad_state() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/integrations/jira/callback?code=test_code&state=garbage")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert_eq!(
        location,
        "http://localhost:3000/integrations?jira_connected=error"
    );
}

#[tokio::test]
async fn callback_redirects_with_error_flag_on_denied_consent() {
    let server = MockServer::start().await;
    let (app, _db) = test_app(&server.uri()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/integrations/jira/callback?error=access_denied")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers().get("location").unwrap().to_str().unwrap();
    assert!(location.ends_with("jira_connected=error"));
}

#[tokio::test]
async fn disconnect_returns_204_then_404() {
    let server = MockServer::start().await;
    let (app, db) = test_app(&server.uri()).await;
    let services = build_services(&db, test_config(&server.uri()));

    let user_id = Uuid::new_v4();
    link_integration(
        &services.repo,
        &user_id,
        "https://example.atlassian.net",
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();

    let delete = |user_id: &Uuid| {
        Request::builder()
            .method("DELETE")
            .uri("/integrations/jira")
            .header("Authorization", format!("Bearer {}", TEST_OPERATOR_TOKEN))
            .header("X-User-Id", user_id.to_string())
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(&user_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(delete(&user_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn projects_for_inactive_integration_returns_integration_inactive() {
    let server = MockServer::start().await;
    let (app, db) = test_app(&server.uri()).await;
    let services = build_services(&db, test_config(&server.uri()));

    let user_id = Uuid::new_v4();
    let integration = link_integration(
        &services.repo,
        &user_id,
        "https://example.atlassian.net",
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();
    services.repo.mark_inactive(&integration.id).await.unwrap();

    let response = app
        .oneshot(get("/integrations/jira/projects", &user_id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INTEGRATION_INACTIVE");
}

#[tokio::test]
async fn search_without_jql_is_rejected() {
    let server = MockServer::start().await;
    let (app, db) = test_app(&server.uri()).await;
    let services = build_services(&db, test_config(&server.uri()));

    let user_id = Uuid::new_v4();
    link_integration(
        &services.repo,
        &user_id,
        "https://example.atlassian.net",
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();

    let response = app
        .oneshot(get("/integrations/jira/search", &user_id))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
}
