//! Domain Services
//!
//! Stateless or self-contained business logic that spans entities.

pub mod binding_resolver;

pub use binding_resolver::{
    Attribution, AttributionSource, BindingResolver, SenderBinding, SenderBindingCache,
    DEFAULT_BINDING_TTL,
};
