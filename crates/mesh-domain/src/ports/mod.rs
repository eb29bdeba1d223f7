//! Domain Port Interfaces
//!
//! Contracts implemented by the infrastructure layer.
//!
//! - **transport** - outbound calls to service endpoints
//! - **observer** - event bus subscribers
//! - **cache_store** - durable snapshots of the response cache

/// Outbound call port
pub mod transport;
/// Event observer port
pub mod observer;
/// Cache snapshot persistence port
pub mod cache_store;

pub use cache_store::CacheSnapshotStore;
pub use observer::{MeshObserver, ObserverRole};
pub use transport::{OutboundRequest, ServiceTransport, TransportResponse};
