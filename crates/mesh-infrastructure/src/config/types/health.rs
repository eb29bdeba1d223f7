//! Health monitor configuration types

use crate::constants::{HEALTH_DEGRADED_THRESHOLD_MS, HEALTH_PROBE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Probe settings; the sweep interval lives in [`super::MeshOptions`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Timeout of a single probe
    pub probe_timeout_ms: u64,
    /// Probes slower than this classify the endpoint as degraded
    pub degraded_threshold_ms: u64,
    /// Feed probe outcomes into the service's circuit breaker
    pub feed_circuit_breaker: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: HEALTH_PROBE_TIMEOUT_MS,
            degraded_threshold_ms: HEALTH_DEGRADED_THRESHOLD_MS,
            feed_circuit_breaker: true,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn degraded_threshold(&self) -> Duration {
        Duration::from_millis(self.degraded_threshold_ms)
    }
}
