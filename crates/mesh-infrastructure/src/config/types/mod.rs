//! Configuration types module

pub mod app;
pub mod cache;
pub mod dispatcher;
pub mod events;
pub mod health;
pub mod logging;
pub mod mesh;
pub mod resilience;
pub mod routing;
pub mod transport;

pub use app::MeshConfig;
pub use cache::{CacheConfig, EvictionPolicy};
pub use dispatcher::DispatcherConfig;
pub use events::EventsConfig;
pub use health::HealthConfig;
pub use logging::LoggingConfig;
pub use mesh::{MeshConfigUpdate, MeshOptions};
pub use resilience::CircuitBreakerConfig;
pub use routing::{LoadBalancingConfig, LoadBalancingPolicy};
pub use transport::TransportConfig;
