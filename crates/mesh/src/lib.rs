//! # Mesh
//!
//! Service mesh coordination layer: a service registry with load balancing,
//! per-service circuit breakers, a TTL-bounded response cache, a
//! concurrency-bounded request dispatcher, a periodic health monitor and an
//! event/metrics pipeline, wired together behind [`ServiceMesh`].
//!
//! ## Example
//!
//! ```ignore
//! use mesh::{Endpoint, ServiceDescriptor, ServiceMesh, ServiceRequest};
//! use mesh::infrastructure::config::MeshConfig;
//!
//! let mesh = ServiceMesh::from_config(MeshConfig::default())?;
//! mesh.register_service(ServiceDescriptor::new(
//!     "pricing",
//!     "Pricing",
//!     Endpoint::new("10.0.0.7", 8080),
//! ))?;
//! mesh.initialize().await?;
//! let quote = mesh.send_request(ServiceRequest::get("pricing", "/quote")).await?;
//! mesh.stop().await;
//! ```
//!
//! ## Architecture
//!
//! - `domain` - entities, value objects, events, errors and port traits
//! - `infrastructure` - registry, resilience, cache, dispatch, health,
//!   observability, configuration and transports
//! - [`ServiceMesh`] - the facade owning one instance of each component

/// Domain layer - entities, errors and port traits
///
/// Re-exports from the domain crate for convenience
pub mod domain {
    pub use mesh_domain::*;
}

/// Infrastructure layer - components, config and logging
///
/// Re-exports from the infrastructure crate for convenience
pub mod infrastructure {
    pub use mesh_infrastructure::*;
}

pub mod init;
mod service_mesh;

// Re-export commonly used domain types at the crate root
pub use domain::*;

pub use init::run;
pub use service_mesh::ServiceMesh;
