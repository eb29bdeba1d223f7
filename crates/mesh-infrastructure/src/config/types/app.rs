//! Root configuration

use super::{
    CacheConfig, CircuitBreakerConfig, DispatcherConfig, EventsConfig, HealthConfig,
    LoadBalancingConfig, LoggingConfig, MeshOptions, TransportConfig,
};
use mesh_domain::ServiceDescriptor;
use serde::{Deserialize, Serialize};

/// Complete mesh configuration
///
/// Every section falls back to its defaults, so a configuration file only
/// needs to name what it changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Feature toggles and intervals
    pub mesh: MeshOptions,
    /// Per-service breaker settings
    pub circuit_breaker: CircuitBreakerConfig,
    /// Response cache
    pub cache: CacheConfig,
    /// Concurrency limits
    pub dispatcher: DispatcherConfig,
    /// Health probes
    pub health: HealthConfig,
    /// Event bus and observers
    pub events: EventsConfig,
    /// Logging
    pub logging: LoggingConfig,
    /// Endpoint selection
    pub load_balancing: LoadBalancingConfig,
    /// HTTP connection pool
    pub transport: TransportConfig,
    /// Services registered at startup
    pub services: Vec<ServiceDescriptor>,
}
