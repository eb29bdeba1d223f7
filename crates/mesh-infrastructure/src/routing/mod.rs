//! Service routing
//!
//! The service registry and the per-service endpoint balancer.

pub mod balancer;
pub mod registry;

pub use balancer::{EndpointBalancer, EndpointLease};
pub use registry::{Registration, ServiceRegistry};
