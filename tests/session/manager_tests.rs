//! Session manager lifecycle tests: ordering, rollback, and serialization.

use std::sync::atomic::Ordering;
use std::time::Duration;

use live_relay::domain::SessionState;
use live_relay::shared::error::SessionError;

use crate::common::*;

#[tokio::test]
async fn test_stream_requires_listener_without_remote_calls() {
    let relay = TestRelay::new();

    let err = relay
        .manager
        .start_stream(stream_config(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::ListenerNotActive));
    assert!(relay.coordinator.calls().is_empty());
    assert_eq!(relay.connector.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stream_start_auto_starts_listener() {
    let relay = TestRelay::new();

    let status = relay
        .manager
        .start_stream(stream_config(), Some(listener_config()))
        .await
        .unwrap();

    assert!(status.active);
    assert_eq!(status.stream.session_id.as_deref(), Some("session-1"));
    assert!(status.stream.heartbeat_running);
    relay.ingestion.wait_for_room(ROOT_ROOM).await;
}

#[tokio::test]
async fn test_bus_failure_rolls_back_remote_session_and_listener() {
    let relay = TestRelay::new();
    relay.connector.fail.store(true, Ordering::SeqCst);

    let err = relay
        .manager
        .start_stream(stream_config(), Some(listener_config()))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::MessageBus(_)));
    assert_eq!(
        relay.coordinator.calls(),
        vec![
            "validate".to_string(),
            format!("start:{}", RELAY_ROOM),
            "stop:session-1:START_ROLLBACK".to_string(),
        ]
    );

    let status = relay.manager.status();
    assert_eq!(status.listener.state, SessionState::Idle);
    assert_eq!(status.stream.state, SessionState::Idle);
    assert!(status.stream.session_id.is_none());
}

#[tokio::test]
async fn test_trial_rejection_rolls_back_combined_start() {
    let relay = TestRelay::new();
    relay.coordinator.allow_trial.store(false, Ordering::SeqCst);

    let err = relay.manager.start(session_config()).await.unwrap_err();

    match err {
        SessionError::TrialRejected { blocked_ids, .. } => {
            assert_eq!(blocked_ids, vec!["team-a".to_string(), "team-b".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(relay.coordinator.count("start:"), 0);
    assert!(!relay.manager.status().listener.active);
}

#[tokio::test]
async fn test_inactive_remote_session_is_rejected() {
    let relay = TestRelay::new();
    *relay.coordinator.start_status.lock() = "PENDING".into();

    let err = relay.manager.start(session_config()).await.unwrap_err();

    assert!(matches!(err, SessionError::RemoteSessionRejected { ref status } if status == "PENDING"));
    assert_eq!(relay.connector.connects.load(Ordering::SeqCst), 0);
    assert_eq!(relay.coordinator.count("stop:"), 0);
}

#[tokio::test]
async fn test_second_stream_start_is_rejected() {
    let relay = TestRelay::new();
    relay.manager.start(session_config()).await.unwrap();

    let err = relay
        .manager
        .start_stream(stream_config(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::AlreadyActive));
    assert_eq!(relay.coordinator.count("start:"), 1);
}

#[tokio::test]
async fn test_listener_restart_stops_active_stream() {
    let relay = TestRelay::new();
    relay.manager.start(session_config()).await.unwrap();

    let status = relay.manager.start_listener(listener_config()).await.unwrap();

    assert!(status.listener.active);
    assert!(!status.stream.active);
    assert_eq!(relay.coordinator.count("stop:session-1:LISTENER_RESTARTED"), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let relay = TestRelay::new();
    relay.manager.start(session_config()).await.unwrap();

    let first = relay.manager.stop(None).await;
    let second = relay.manager.stop(None).await;

    assert!(!first.active);
    assert!(!second.active);
    assert_eq!(relay.coordinator.count("stop:"), 1);
    assert_eq!(relay.coordinator.count("stop:session-1:MANUAL_STOP"), 1);
}

#[tokio::test]
async fn test_concurrent_starts_are_serialized() {
    let relay = TestRelay::new();

    let (a, b) = tokio::join!(
        relay.manager.start(session_config()),
        relay.manager.start(session_config())
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    // The second start replaced the first session cleanly
    assert_eq!(relay.coordinator.count("start:"), 2);
    assert_eq!(relay.coordinator.count("stop:session-1:LISTENER_RESTARTED"), 1);

    let status = relay.manager.status();
    assert!(status.active);
    assert_eq!(status.stream.session_id.as_deref(), Some("session-2"));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_reports_while_stream_active() {
    let relay = TestRelay::new();
    relay.manager.start(session_config()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(relay.coordinator.count("heartbeat") >= 2);

    relay.manager.stop(None).await;
    let sent = relay.coordinator.count("heartbeat");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(relay.coordinator.count("heartbeat"), sent);
}
