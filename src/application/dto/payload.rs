//! Publish payload encoding.
//!
//! Events are published as flat attribute maps keyed by event kind. The
//! `entityId` attribute always carries the resolved entity, never an id the
//! sender or platform declared.

use serde_json::{json, Map, Value};

use crate::domain::{Attribution, LiveEvent};

/// Flat attribute map for an attributed event published under `room_id`.
pub fn encode_event(room_id: &str, event: &LiveEvent, attribution: &Attribution) -> Map<String, Value> {
    let value = match event {
        LiveEvent::Gift(gift) => json!({
            "type": event.kind(),
            "roomId": room_id,
            "externalRoomId": gift.room_id,
            "senderId": gift.sender_id,
            "senderName": gift.sender_name,
            "senderLevel": gift.sender_level,
            "entityId": attribution.entity_id,
            "entityName": attribution.entity_name,
            "giftId": gift.gift_id,
            "giftName": gift.gift_name,
            "giftCount": gift.gift_count,
            "value": attribution.scale(gift.total_value()),
            "timestamp": gift.timestamp.timestamp_millis(),
        }),
        LiveEvent::Chat(chat) => json!({
            "type": event.kind(),
            "roomId": room_id,
            "externalRoomId": chat.room_id,
            "senderId": chat.sender_id,
            "senderName": chat.sender_name,
            "entityId": attribution.entity_id,
            "entityName": attribution.entity_name,
            "message": chat.message,
            "timestamp": chat.timestamp.timestamp_millis(),
        }),
    };

    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Serialized payload bytes for the message bus.
pub fn encode_event_bytes(
    room_id: &str,
    event: &LiveEvent,
    attribution: &Attribution,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&encode_event(room_id, event, attribution))
}
