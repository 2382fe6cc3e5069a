//! Redis Pub/Sub Module
//!
//! Redis-backed collaborators for both ends of the relay.
//!
//! # Architecture
//!
//! ```text
//! browser automation                                  downstream consumers
//!        |                                                     ^
//!        | PUBLISH relay:ingest:{room}                         | relay:room:{id}:events
//!        v                                                     |
//! +--------------------------+                      +----------------------+
//! | RedisIngestionProvider   | --> ListenerSession  |  RedisMessageBus     |
//! +--------------------------+        |             +----------------------+
//!                                     v                        ^
//!                               StreamSession -----------------+
//! ```
//!
//! Publishing goes through a `ConnectionManager`, which reconnects on its
//! own. Every subscription gets a dedicated pub/sub connection driven by a
//! spawned task that exits when its cancellation token fires.

mod bus;
mod ingestion;

pub use bus::{RedisBusConnector, RedisMessageBus};
pub use ingestion::{ingest_channel, IngestFrame, RedisIngestionProvider};

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
///
/// # Example
/// ```rust,ignore
/// let settings = RedisSettings { url: "redis://localhost:6379".into() };
/// let conn = create_redis_client(&settings).await?;
/// ```
#[instrument(skip(settings))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}
