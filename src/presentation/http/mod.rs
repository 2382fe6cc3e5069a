//! HTTP API
//!
//! Control API routes and handlers.

pub mod handlers;
pub mod routes;
