//! Load balancing configuration types

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an endpoint is chosen among a service's eligible endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingPolicy {
    /// Rotate through endpoints in order
    #[default]
    RoundRobin,
    /// Fewest in-flight calls; ties go to the earlier endpoint
    LeastConnections,
    /// Uniformly random
    Random,
}

impl fmt::Display for LoadBalancingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastConnections => write!(f, "least_connections"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Endpoint selection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancingConfig {
    pub policy: LoadBalancingPolicy,
    /// Exclude endpoints whose last probe was unhealthy
    pub skip_unhealthy: bool,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            policy: LoadBalancingPolicy::RoundRobin,
            skip_unhealthy: true,
        }
    }
}
