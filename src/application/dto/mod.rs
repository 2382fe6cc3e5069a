//! Data Transfer Objects
//!
//! Session configurations, status snapshots, and publish payload encoding.

pub mod payload;
pub mod request;
pub mod response;

pub use payload::{encode_event, encode_event_bytes};
pub use request::{
    AttachRoomRequest, ListenerConfig, SessionConfig, StartStreamRequest, StopRequest, StreamConfig,
};
pub use response::{ActionResponse, ListenerStatus, RecentEvent, SessionStatus, StreamStatus};
