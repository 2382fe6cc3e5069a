//! Domain Entities
//!
//! Core domain entities and collaborator contracts.

mod collaborators;
mod connection;
mod event;
mod team;

pub use collaborators::*;
pub use connection::{Connection, ConnectionStatus, SessionState};
pub use event::{ChatEvent, GiftEvent, LiveEvent};
pub use team::{EntityConfig, GiftCatalog, GiftDefinition, TeamConfig};
