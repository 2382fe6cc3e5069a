//! Application Services
//!
//! Session runtime built on the domain collaborators.
//!
//! ## Available Services
//!
//! - **EventBuffer**: Time-windowed FIFO of undelivered events
//! - **ListenerSession**: Upstream room ingestion, buffering, live fan-out
//! - **StreamSession**: Attribution and downstream publishing
//! - **HeartbeatService**: Periodic connection-health push to the coordinator
//! - **SessionManager**: Serialized facade over listener and stream

pub mod event_buffer;
pub mod heartbeat_service;
pub mod listener_session;
pub mod session_manager;
pub mod stream_session;

pub use event_buffer::{EventBuffer, PendingEvent, DEFAULT_BUFFER_TTL};
pub use heartbeat_service::{HeartbeatService, DEFAULT_HEARTBEAT_INTERVAL};
pub use listener_session::{EventSource, ListenerSession, LiveSubscription};
pub use session_manager::{SessionManager, DEFAULT_STOP_REASON};
pub use stream_session::{
    broadcast_destination, publish_destination, InboundMessage, StreamOptions, StreamSession,
    ROLLBACK_STOP_REASON,
};
