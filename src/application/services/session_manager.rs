//! Session Manager
//!
//! Facade over the listener and stream sessions. Every mutating call is
//! serialized through one async mutex, so concurrent HTTP requests cannot
//! interleave start/stop protocols.
//!
//! Lifecycle rules:
//! - Restarting or stopping the listener stops an active stream first.
//! - `start_stream` starts the listener when it is inactive and a listener
//!   configuration is supplied; that listener is rolled back if the stream
//!   then fails.
//! - Combined `start` rolls back the listener if the stream fails.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

use super::listener_session::{EventSource, ListenerSession};
use super::stream_session::{InboundMessage, StreamOptions, StreamSession};
use crate::application::dto::{ListenerConfig, SessionConfig, SessionStatus, StreamConfig};
use crate::domain::{Coordinator, IngestionProvider, LiveEvent, MessageBusConnector};
use crate::shared::error::SessionError;

/// Reason reported to the coordinator when no caller reason is given.
pub const DEFAULT_STOP_REASON: &str = "MANUAL_STOP";

const LISTENER_RESTART_REASON: &str = "LISTENER_RESTARTED";
const LISTENER_STOP_REASON: &str = "LISTENER_STOPPED";

pub struct SessionManager {
    listener: Arc<ListenerSession>,
    stream: StreamSession,
    ops: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        ingestion: Arc<dyn IngestionProvider>,
        coordinator: Arc<dyn Coordinator>,
        connector: Arc<dyn MessageBusConnector>,
        options: StreamOptions,
    ) -> Self {
        let listener = Arc::new(ListenerSession::new(ingestion, options.session.clone()));
        let source: Arc<dyn EventSource> = listener.clone();
        let stream = StreamSession::new(coordinator, connector, source, options);

        Self {
            listener,
            stream,
            ops: Mutex::new(()),
        }
    }

    pub fn listener(&self) -> &ListenerSession {
        &self.listener
    }

    pub fn stream(&self) -> &StreamSession {
        &self.stream
    }

    // ========================================================================
    // Listener
    // ========================================================================

    pub async fn start_listener(&self, config: ListenerConfig) -> Result<SessionStatus, SessionError> {
        let _guard = self.ops.lock().await;
        if self.stream.is_active() {
            warn!("Stopping active stream before restarting listener");
            self.stream.stop(LISTENER_RESTART_REASON).await;
        }
        self.listener.start(config).await?;
        Ok(self.status())
    }

    pub async fn stop_listener(&self) -> SessionStatus {
        let _guard = self.ops.lock().await;
        if self.stream.is_active() {
            self.stream.stop(LISTENER_STOP_REASON).await;
        }
        self.listener.stop().await;
        self.status()
    }

    pub fn attach_room(&self, room_id: &str) -> Result<bool, SessionError> {
        self.listener.attach_room(room_id)
    }

    // ========================================================================
    // Stream
    // ========================================================================

    /// Start the stream, starting the listener first if needed.
    ///
    /// With no `listener` config and an inactive listener this fails with
    /// `ListenerNotActive` and performs no remote calls.
    pub async fn start_stream(
        &self,
        stream: StreamConfig,
        listener: Option<ListenerConfig>,
    ) -> Result<SessionStatus, SessionError> {
        let _guard = self.ops.lock().await;

        let mut auto_started = false;
        if !self.listener.is_active() {
            if let Some(config) = listener {
                info!("Listener inactive; starting it before the stream");
                self.listener.start(config).await?;
                auto_started = true;
            }
        }

        if let Err(e) = self.stream.start(stream).await {
            if auto_started {
                warn!("Stream start failed; stopping auto-started listener");
                self.listener.stop().await;
            }
            return Err(e);
        }
        Ok(self.status())
    }

    pub async fn stop_stream(&self, reason: Option<&str>) -> SessionStatus {
        let _guard = self.ops.lock().await;
        self.stream.stop(reason.unwrap_or(DEFAULT_STOP_REASON)).await;
        self.status()
    }

    // ========================================================================
    // Combined
    // ========================================================================

    /// Start listener and stream in one call. The listener is rolled back if
    /// the stream fails to start.
    pub async fn start(&self, config: SessionConfig) -> Result<SessionStatus, SessionError> {
        let _guard = self.ops.lock().await;

        if self.stream.is_active() {
            warn!("Session already active; restarting");
            self.stream.stop(LISTENER_RESTART_REASON).await;
        }
        self.listener.start(config.listener).await?;

        if let Err(e) = self.stream.start(config.stream).await {
            warn!(error = %e, "Stream start failed; rolling back listener");
            self.listener.stop().await;
            return Err(e);
        }

        info!("Session started");
        Ok(self.status())
    }

    pub async fn stop(&self, reason: Option<&str>) -> SessionStatus {
        let _guard = self.ops.lock().await;
        self.stream.stop(reason.unwrap_or(DEFAULT_STOP_REASON)).await;
        self.listener.stop().await;
        info!("Session stopped");
        self.status()
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn status(&self) -> SessionStatus {
        SessionStatus::new(self.listener.status(), self.stream.status())
    }

    pub fn subscribe_events(&self) -> mpsc::Receiver<LiveEvent> {
        self.listener.subscribe()
    }

    pub fn subscribe_inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.stream.subscribe_inbound()
    }
}
