//! Listener session tests.

use std::time::Duration;

use live_relay::domain::{ConnectionStatus, IngestionStatus, LiveEvent, SessionState};
use live_relay::shared::error::SessionError;

use crate::common::*;

#[tokio::test]
async fn test_listener_connects_root_and_entity_rooms() {
    let relay = TestRelay::new();
    let mut config = listener_config();
    config.team.entities[1].room_id = Some("ext-b".into());

    let status = relay.manager.start_listener(config).await.unwrap();
    assert!(status.listener.active);
    assert_eq!(status.listener.total_rooms, 2);
    assert_eq!(status.listener.connections[0].external_room_id, ROOT_ROOM);

    relay.ingestion.wait_for_room(ROOT_ROOM).await;
    relay.ingestion.wait_for_room("ext-b").await;
    relay.ingestion.status(
        ROOT_ROOM,
        IngestionStatus::Connected {
            resolved_room_id: Some("7001".into()),
            display_name: Some("Root".into()),
            avatar: None,
        },
    );

    let status = relay.manager.status();
    assert_eq!(status.listener.connected_rooms, 1);
    assert_eq!(
        status.listener.connections[0].resolved_room_id.as_deref(),
        Some("7001")
    );
    assert_eq!(status.listener.connections[1].status, ConnectionStatus::Connecting);
}

#[tokio::test]
async fn test_listener_without_room_is_rejected() {
    let relay = TestRelay::new();
    let mut config = listener_config();
    config.room_id = None;

    let err = relay.manager.start_listener(config).await.unwrap_err();
    assert!(matches!(err, SessionError::MissingRoomId));
    assert_eq!(relay.manager.listener().state(), SessionState::Idle);
}

#[tokio::test]
async fn test_failed_room_does_not_stop_listener() {
    let relay = TestRelay::new();
    relay.ingestion.fail_room(ROOT_ROOM);

    relay.manager.start_listener(listener_config()).await.unwrap();

    eventually(|| {
        relay.manager.status().listener.connections[0].status == ConnectionStatus::Error
    })
    .await;
    let status = relay.manager.status();
    assert!(status.listener.active);
    assert!(status.listener.connections[0]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("offline"));
}

#[tokio::test]
async fn test_ingested_events_reach_observers_and_buffer() {
    let relay = TestRelay::new();
    relay.manager.start_listener(listener_config()).await.unwrap();
    relay.ingestion.wait_for_room(ROOT_ROOM).await;

    let mut observer = relay.manager.subscribe_events();
    relay.ingestion.gift(ROOT_ROOM, gift("alice", "Rose", 5));
    relay.ingestion.chat(ROOT_ROOM, chat("alice", "go team"));

    let first = observer.recv().await.unwrap();
    assert!(matches!(first, LiveEvent::Gift(ref g) if g.sender_id == "alice"));
    let second = observer.recv().await.unwrap();
    assert_eq!(second.kind(), "CHAT");

    let status = relay.manager.status();
    assert_eq!(status.listener.buffered_events, 2);
    assert_eq!(status.listener.connections[0].messages_received, 2);
    assert_eq!(status.listener.connections[0].total_value, 5);
    assert_eq!(status.listener.recent_events[0].kind, "CHAT");
}

#[tokio::test]
async fn test_attach_room_requires_active_listener() {
    let relay = TestRelay::new();
    let err = relay.manager.attach_room("ext-late").unwrap_err();
    assert!(matches!(err, SessionError::ListenerNotActive));

    relay.manager.start_listener(listener_config()).await.unwrap();
    assert!(relay.manager.attach_room("ext-late").unwrap());
    assert!(!relay.manager.attach_room("ext-late").unwrap());

    relay.ingestion.wait_for_room("ext-late").await;
    assert_eq!(relay.manager.status().listener.total_rooms, 2);
}

#[tokio::test]
async fn test_stop_listener_releases_rooms() {
    let relay = TestRelay::new();
    relay.manager.start_listener(listener_config()).await.unwrap();
    relay.ingestion.wait_for_room(ROOT_ROOM).await;
    relay.ingestion.gift(ROOT_ROOM, gift("alice", "Rose", 1));

    let status = relay.manager.stop_listener().await;
    assert!(!status.listener.active);
    assert_eq!(status.listener.total_rooms, 0);
    assert_eq!(status.listener.buffered_events, 0);
    assert!(!relay.ingestion.is_running(ROOT_ROOM));

    // Second stop is a no-op
    let status = relay.manager.stop_listener().await;
    assert_eq!(status.listener.state, SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_buffered_events_expire_after_ttl() {
    let relay = TestRelay::new();
    relay.manager.start_listener(listener_config()).await.unwrap();
    relay.ingestion.wait_for_room(ROOT_ROOM).await;

    relay.ingestion.gift(ROOT_ROOM, gift("alice", "Rose", 1));
    tokio::time::advance(Duration::from_secs(301)).await;
    relay.ingestion.gift(ROOT_ROOM, gift("bob", "Diamond", 1));

    assert_eq!(relay.manager.status().listener.buffered_events, 1);

    relay
        .manager
        .start_stream(stream_config(), None)
        .await
        .unwrap();

    let published = relay.bus().published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1["senderId"], "bob");
}
