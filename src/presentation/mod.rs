//! Presentation Layer
//!
//! HTTP control API and middleware.

pub mod http;
pub mod middleware;
