//! Value objects exchanged between mesh components

mod cache;
mod circuit;
mod health;
mod request;
mod status;

pub use cache::CacheEntry;
pub use circuit::CircuitState;
pub use health::HealthStatus;
pub use request::{HttpMethod, ServiceRequest, ServiceResponse};
pub use status::MeshStatus;
