//! Session control API tests

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use serde_json::json;

use crate::common::*;

fn session_body() -> String {
    serde_json::to_string(&session_config()).unwrap()
}

#[tokio::test]
async fn test_status_when_idle() {
    let app = TestApp::new();

    let response = app.get("/api/v1/session").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["active"], false);
    assert_eq!(body["listener"]["state"], "IDLE");
    assert_eq!(body["stream"]["publishedEvents"], 0);
}

#[tokio::test]
async fn test_start_and_stop_session() {
    let app = TestApp::new();

    let response = app.post_json("/api/v1/session/start", &session_body()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["status"]["active"], true);
    assert_eq!(body["status"]["stream"]["sessionId"], "session-1");

    let response = app
        .post_json("/api/v1/session/stop", r#"{"reason":"EVENT_OVER"}"#)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"]["active"], false);
    assert_eq!(app.relay.coordinator.count("stop:session-1:EVENT_OVER"), 1);
}

#[tokio::test]
async fn test_stop_without_body_uses_default_reason() {
    let app = TestApp::new();
    app.relay.manager.start(session_config()).await.unwrap();

    let response = app.post_empty("/api/v1/session/stop").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.relay.coordinator.count("stop:session-1:MANUAL_STOP"), 1);
}

#[tokio::test]
async fn test_stream_start_without_listener_conflicts() {
    let app = TestApp::new();
    let body = json!({ "stream": stream_config() }).to_string();

    let response = app.post_json("/api/v1/stream/start", &body).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], 21001);
    assert!(app.relay.coordinator.calls().is_empty());
}

#[tokio::test]
async fn test_stream_start_with_listener_config() {
    let app = TestApp::new();
    let body = json!({ "stream": stream_config(), "listener": listener_config() }).to_string();

    let response = app.post_json("/api/v1/stream/start", &body).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"]["listener"]["active"], true);
    assert_eq!(body["status"]["stream"]["active"], true);
}

#[tokio::test]
async fn test_listener_start_without_room_is_bad_request() {
    let app = TestApp::new();

    let response = app.post_json("/api/v1/listener/start", "{}").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 21002);
}

#[tokio::test]
async fn test_trial_rejection_is_forbidden() {
    let app = TestApp::new();
    app.relay.coordinator.allow_trial.store(false, Ordering::SeqCst);

    let response = app.post_json("/api/v1/session/start", &session_body()).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["code"], 21003);
    assert_eq!(body["message"], "Trial already used");
    assert_eq!(body["blocked_ids"], json!(["team-a", "team-b"]));
    assert_eq!(body["reason"], "TRIAL_USED");
}

#[tokio::test]
async fn test_bus_failure_is_bad_gateway() {
    let app = TestApp::new();
    app.relay.connector.fail.store(true, Ordering::SeqCst);

    let response = app.post_json("/api/v1/session/start", &session_body()).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["code"], 21005);
    assert!(!app.relay.manager.status().listener.active);
}

#[tokio::test]
async fn test_attach_room_reports_created_once() {
    let app = TestApp::new();
    let body = json!({ "roomId": "ext-late" }).to_string();

    let response = app.post_json("/api/v1/listener/rooms", &body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.relay
        .manager
        .start_listener(listener_config())
        .await
        .unwrap();

    let response = app.post_json("/api/v1/listener/rooms", &body).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.post_json("/api/v1/listener/rooms", &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"]["listener"]["totalRooms"], 2);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = TestApp::new();

    let response = app.post_json("/api/v1/session/start", "{not json").await;

    assert!(response.status().is_client_error());
    assert!(app.relay.coordinator.calls().is_empty());
}
