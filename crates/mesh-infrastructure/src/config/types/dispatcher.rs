//! Dispatcher configuration types

use crate::constants::{MAX_CONCURRENT_REQUESTS, SLOT_ACQUIRE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concurrency limits for outbound calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// In-flight calls allowed across all services
    pub max_concurrent_requests: usize,
    /// In-flight calls allowed per service; unlimited beyond the global bound when unset
    pub max_concurrent_per_service: Option<usize>,
    /// Time a caller may wait for a slot
    pub acquire_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            max_concurrent_per_service: None,
            acquire_timeout_ms: SLOT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl DispatcherConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}
