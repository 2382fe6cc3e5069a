//! Application Layer
//!
//! Session services and data transfer objects (DTOs). This layer drives the
//! domain collaborators and owns all mutable session state.

pub mod services;
pub mod dto;
