//! # Mesh Infrastructure Layer
//!
//! Runtime components of the service mesh. The `mesh` crate wires them
//! together behind the `ServiceMesh` facade.
//!
//! ## Module Categories
//!
//! ### Routing & Resilience
//! | Module | Description |
//! |--------|-------------|
//! | [`routing`] | Service registry and endpoint load balancing |
//! | [`resilience`] | Per-service circuit breakers |
//! | [`dispatch`] | Request dispatcher and concurrency limiter |
//! | [`transport`] | HTTP and scripted service transports |
//!
//! ### Data & Storage
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL response cache with LRU/LFU eviction and snapshots |
//!
//! ### Configuration
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Figment configuration loading and validation |
//! | [`constants`] | Centralized defaults |
//!
//! ### Observability
//! | Module | Description |
//! |--------|-------------|
//! | [`health`] | Background endpoint health monitor |
//! | [`events`] | Observer event bus |
//! | [`observability`] | Metrics collector, structured logger, alerting |
//! | [`logging`] | Structured logging with tracing |

// Core infrastructure modules
pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error_ext;
pub mod events;
pub mod health;
pub mod logging;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use error_ext::ErrorContext;
pub use utils::{ScheduledTask, TimedOperation};
