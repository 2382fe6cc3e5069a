//! Redis ingestion adapter.
//!
//! The browser-automation process decodes the platform's live-room protocol
//! and publishes one JSON frame per decoded message to
//! `relay:ingest:{external_room_id}`. Frames are tagged by `type`:
//!
//! | type        | payload                                     |
//! |-------------|---------------------------------------------|
//! | `gift`      | `GiftEvent` fields                          |
//! | `chat`      | `ChatEvent` fields                          |
//! | `room_info` | `resolvedRoomId`, `displayName`, `avatar`   |
//! | `error`     | `message`                                   |
//! | `ended`     | none; the room's live stream is over        |

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::PubSub;
use redis::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    ChatEvent, ChatHandler, GiftEvent, GiftHandler, IngestionConnection, IngestionError,
    IngestionProvider, IngestionStatus, StatusHandler,
};

/// Channel the automation process publishes a room's frames to.
pub fn ingest_channel(room_id: &str) -> String {
    format!("relay:ingest:{}", room_id)
}

/// One decoded upstream frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestFrame {
    Gift(GiftEvent),
    Chat(ChatEvent),
    #[serde(rename_all = "camelCase")]
    RoomInfo {
        #[serde(default)]
        resolved_room_id: Option<String>,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
    },
    Error {
        message: String,
    },
    Ended,
    #[serde(other)]
    Unknown,
}

/// Opens one Redis pub/sub subscription per upstream room.
#[derive(Debug, Clone)]
pub struct RedisIngestionProvider {
    client: Client,
}

impl RedisIngestionProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn open(url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self::new(Client::open(url)?))
    }
}

#[async_trait]
impl IngestionProvider for RedisIngestionProvider {
    #[instrument(skip(self))]
    async fn create_connection(
        &self,
        room_id: &str,
    ) -> Result<Box<dyn IngestionConnection>, IngestionError> {
        let connect_error = |e: redis::RedisError| IngestionError::Connect {
            room_id: room_id.to_string(),
            message: e.to_string(),
        };

        let mut pubsub = self.client.get_async_pubsub().await.map_err(connect_error)?;
        pubsub
            .subscribe(ingest_channel(room_id))
            .await
            .map_err(connect_error)?;

        debug!(room_id = %room_id, "Ingestion channel subscribed");
        Ok(Box::new(RedisIngestionConnection {
            room_id: room_id.to_string(),
            pubsub: Some(pubsub),
            on_gift: None,
            on_chat: None,
            on_status: None,
        }))
    }
}

pub struct RedisIngestionConnection {
    room_id: String,
    pubsub: Option<PubSub>,
    on_gift: Option<GiftHandler>,
    on_chat: Option<ChatHandler>,
    on_status: Option<StatusHandler>,
}

impl RedisIngestionConnection {
    fn report(&self, status: IngestionStatus) {
        if let Some(handler) = &self.on_status {
            handler(status);
        }
    }

    /// Dispatch one frame. Returns `false` once the room has ended.
    fn dispatch(&self, frame: IngestFrame, resolved: &mut String) -> bool {
        match frame {
            IngestFrame::Gift(mut gift) => {
                if gift.room_id.is_empty() {
                    gift.room_id = self.room_id.clone();
                }
                if let Some(handler) = &self.on_gift {
                    handler(gift);
                }
            }
            IngestFrame::Chat(mut chat) => {
                if chat.room_id.is_empty() {
                    chat.room_id = self.room_id.clone();
                }
                if let Some(handler) = &self.on_chat {
                    handler(chat);
                }
            }
            IngestFrame::RoomInfo {
                resolved_room_id,
                display_name,
                avatar,
            } => {
                if let Some(id) = &resolved_room_id {
                    *resolved = id.clone();
                }
                self.report(IngestionStatus::Connected {
                    resolved_room_id,
                    display_name,
                    avatar,
                });
            }
            IngestFrame::Error { message } => {
                self.report(IngestionStatus::Error(message));
            }
            IngestFrame::Ended => {
                info!(room_id = %self.room_id, "Upstream room ended");
                return false;
            }
            IngestFrame::Unknown => {
                debug!(room_id = %self.room_id, "Ignoring unknown frame type");
            }
        }
        true
    }
}

#[async_trait]
impl IngestionConnection for RedisIngestionConnection {
    fn on_gift(&mut self, handler: GiftHandler) {
        self.on_gift = Some(handler);
    }

    fn on_chat(&mut self, handler: ChatHandler) {
        self.on_chat = Some(handler);
    }

    fn on_status(&mut self, handler: StatusHandler) {
        self.on_status = Some(handler);
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<String, IngestionError> {
        let mut pubsub = self.pubsub.take().ok_or(IngestionError::Closed)?;
        let mut resolved = self.room_id.clone();

        let mut messages = std::pin::pin!(pubsub.on_message());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(resolved),
                message = messages.next() => {
                    let Some(message) = message else {
                        return Err(IngestionError::Closed);
                    };
                    let frame = match serde_json::from_slice::<IngestFrame>(message.get_payload_bytes()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(room_id = %self.room_id, error = %e, "Malformed ingestion frame");
                            continue;
                        }
                    };
                    if !self.dispatch(frame, &mut resolved) {
                        self.report(IngestionStatus::Disconnected);
                        return Ok(resolved);
                    }
                }
            }
        }
    }
}
