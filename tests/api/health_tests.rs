//! Health Check API Tests

use axum::http::StatusCode;

use crate::common::*;

/// Test basic health check endpoint returns 200 OK
#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new();

    let response = app.get("/health/live").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "alive");
}

/// Readiness includes session state; without a Redis probe it stays ready
#[tokio::test]
async fn test_readiness_reports_sessions() {
    let app = TestApp::new();

    let response = app.get("/health/ready").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["checks"]["sessions"]["listener"], "IDLE");
    assert_eq!(body["checks"]["sessions"]["stream"], "IDLE");
}

/// An active listener with no connected room is degraded but still ready
#[tokio::test]
async fn test_readiness_degraded_when_rooms_down() {
    let app = TestApp::new();
    app.relay
        .manager
        .start_listener(listener_config())
        .await
        .unwrap();

    let response = app.get("/health/ready").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["sessions"]["totalRooms"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint_is_exposed() {
    let app = TestApp::new();

    let response = app.get("/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
}
