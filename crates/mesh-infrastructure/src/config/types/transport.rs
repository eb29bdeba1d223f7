//! HTTP transport configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection pool settings of the HTTP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum idle connections kept per host
    pub max_idle_per_host: usize,
    /// Idle connection lifetime
    pub idle_timeout_secs: u64,
    /// TCP keep-alive interval
    pub keepalive_secs: u64,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// User agent sent with every call
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout_secs: 90,
            keepalive_secs: 60,
            connect_timeout_ms: 2_000,
            user_agent: format!("mesh/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
