//! # Live Relay Library
//!
//! This crate relays live-stream interaction events to downstream consumers:
//! - Per-room upstream ingestion with a time-windowed event buffer
//! - Strict team attribution through sender bindings
//! - Redis pub/sub publishing with drain-then-live delivery
//! - Coordinator session lifecycle with heartbeats
//! - HTTP control API
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Events, connections, team configuration, collaborator traits, attribution
//! - **Application Layer**: Listener/stream sessions, heartbeat, session manager, DTOs
//! - **Infrastructure Layer**: Redis pub/sub, coordinator REST client, metrics
//! - **Presentation Layer**: HTTP handlers and middleware
//!
//! ## Module Structure
//!
//! ```text
//! live_relay/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, collaborator traits, attribution
//! +-- application/    Session services and DTOs
//! +-- infrastructure/ Redis, coordinator, and metrics implementations
//! +-- presentation/   HTTP routes and middleware
//! +-- shared/         Error taxonomy
//! ```

// Configuration module
pub mod config;

// Domain layer - Core relay concepts
pub mod domain;

// Application layer - Session services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP control API
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
