//! Circuit breaker configuration types

use crate::constants::{
    CALL_TIMEOUT_MS, CIRCUIT_BREAKER_FAILURE_THRESHOLD, CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECS,
    CIRCUIT_BREAKER_SUCCESS_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every per-service breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker
    pub success_threshold: u32,
    /// Time an open breaker rejects calls before admitting a probe
    pub recovery_timeout_ms: u64,
    /// Outbound call timeout
    pub call_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            success_threshold: CIRCUIT_BREAKER_SUCCESS_THRESHOLD,
            recovery_timeout_ms: CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECS * 1000,
            call_timeout_ms: CALL_TIMEOUT_MS,
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the success threshold
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set the recovery timeout
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
