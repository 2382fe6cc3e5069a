//! # Domain Layer
//!
//! The domain layer contains the core relay concepts and is independent of
//! Redis, HTTP, and the session runtime.
//!
//! ## Structure
//!
//! - **entities**: Live events, room connections, team/gift configuration,
//!   and the collaborator traits the sessions consume
//! - **services**: Event attribution (`BindingResolver`)
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Collaborator traits define the ingestion, bus, and coordinator contracts
//! - Attribution is pure and clock-injected so it can be tested without timers

pub mod entities;
pub mod services;

// Re-export commonly used types
pub use entities::*;
pub use services::*;
