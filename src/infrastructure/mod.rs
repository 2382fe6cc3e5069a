//! Infrastructure Layer
//!
//! Concrete collaborator implementations:
//! - Redis pub/sub message bus and ingestion adapter
//! - Remote coordinator REST client
//! - Prometheus metrics

pub mod coordinator;
pub mod metrics;
pub mod pubsub;
