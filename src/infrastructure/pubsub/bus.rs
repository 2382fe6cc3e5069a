//! Redis message bus.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use reqwest::Url;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::{BusCredentials, BusError, InboundHandler, MessageBus, MessageBusConnector};

/// Opens `RedisMessageBus` connections.
#[derive(Debug, Default, Clone)]
pub struct RedisBusConnector;

impl RedisBusConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Embed credentials into a Redis URL, keeping any the URL already carries.
pub(crate) fn url_with_credentials(url: &str, credentials: &BusCredentials) -> Result<String, BusError> {
    if credentials.username.is_none() && credentials.password.is_none() {
        return Ok(url.to_string());
    }

    let mut parsed = Url::parse(url).map_err(|e| BusError::Connect(format!("invalid bus url: {}", e)))?;
    if parsed.username().is_empty() {
        if let Some(username) = &credentials.username {
            parsed
                .set_username(username)
                .map_err(|_| BusError::Connect("bus url cannot carry a username".into()))?;
        }
    }
    if parsed.password().is_none() {
        if let Some(password) = &credentials.password {
            parsed
                .set_password(Some(password))
                .map_err(|_| BusError::Connect("bus url cannot carry a password".into()))?;
        }
    }
    Ok(parsed.to_string())
}

#[async_trait]
impl MessageBusConnector for RedisBusConnector {
    #[instrument(skip_all)]
    async fn connect(
        &self,
        url: &str,
        credentials: &BusCredentials,
    ) -> Result<Arc<dyn MessageBus>, BusError> {
        let url = url_with_credentials(url, credentials)?;
        let client = Client::open(url.as_str()).map_err(|e| BusError::Connect(e.to_string()))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        info!("Message bus connected");
        Ok(Arc::new(RedisMessageBus {
            client,
            publisher,
            cancel: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
        }))
    }
}

/// Redis pub/sub message bus.
///
/// Publishes through a reconnecting `ConnectionManager`; each subscription
/// runs on its own pub/sub connection until `disconnect`.
pub struct RedisMessageBus {
    client: Client,
    publisher: ConnectionManager,
    cancel: CancellationToken,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl MessageBus for RedisMessageBus {
    async fn publish(&self, destination: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.cancel.is_cancelled() {
            return Err(BusError::NotConnected);
        }

        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(destination, payload)
            .await
            .map_err(|e| BusError::Publish {
                destination: destination.to_string(),
                message: e.to_string(),
            })?;

        debug!(destination = %destination, receivers, "Published");
        Ok(())
    }

    #[instrument(skip(self, handler))]
    async fn subscribe(&self, destination: &str, handler: InboundHandler) -> Result<(), BusError> {
        if self.cancel.is_cancelled() {
            return Err(BusError::NotConnected);
        }

        let subscribe_error = |e: redis::RedisError| BusError::Subscribe {
            destination: destination.to_string(),
            message: e.to_string(),
        };
        let mut pubsub = self.client.get_async_pubsub().await.map_err(subscribe_error)?;
        pubsub.subscribe(destination).await.map_err(subscribe_error)?;

        let cancel = self.cancel.child_token();
        let channel = destination.to_string();
        let handle = tokio::spawn(async move {
            let mut messages = std::pin::pin!(pubsub.on_message());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = messages.next() => match message {
                        Some(message) => handler(message.get_payload_bytes().to_vec()),
                        None => {
                            warn!(channel = %channel, "Subscription stream closed");
                            break;
                        }
                    },
                }
            }
            debug!(channel = %channel, "Subscription task exited");
        });
        self.subscriptions.lock().push(handle);

        info!(destination = %destination, "Subscribed");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.cancel.cancel();
        let handles: Vec<_> = self.subscriptions.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Subscription task ended abnormally");
            }
        }
        info!("Message bus disconnected");
        Ok(())
    }
}
