//! # Mesh Domain Layer
//!
//! Core types shared by every part of the service mesh. This crate has no
//! runtime dependencies: it defines what a service is, how a call is
//! described, what the mesh reports about itself, and the ports that the
//! infrastructure layer implements.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`entities`] | Service descriptors and endpoints |
//! | [`value_objects`] | Requests, responses, health and breaker states, cache entries |
//! | [`events`] | Mesh lifecycle and request events |
//! | [`ports`] | Transport, observer and cache snapshot contracts |
//! | [`error`] | Error taxonomy shared by all crates |
//! | [`constants`] | Validation limits |

pub mod constants;
pub mod entities;
pub mod error;
pub mod events;
pub mod ports;
pub mod value_objects;

pub use entities::{Endpoint, Protocol, ServiceDescriptor};
pub use error::{Error, Result, TimeoutOperation};
pub use events::{MeshEvent, MeshEventKind};
pub use value_objects::{
    CacheEntry, CircuitState, HealthStatus, HttpMethod, MeshStatus, ServiceRequest,
    ServiceResponse,
};
