//! Mesh-wide feature toggles and the runtime update

use crate::constants::{HEALTH_CHECK_INTERVAL_SECS, MONITORING_INTERVAL_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Feature toggles and background intervals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOptions {
    /// Run the background health monitor
    pub enable_health_checks: bool,
    /// Spread calls over all endpoints; when off the first endpoint is always used
    pub enable_load_balancing: bool,
    /// Consult and update per-service breakers
    pub enable_circuit_breaker: bool,
    /// Feed the metrics collector
    pub enable_metrics: bool,
    /// Serve GET responses from the response cache
    pub enable_caching: bool,
    /// Interval between mesh-wide gauge refreshes
    pub monitoring_interval_ms: u64,
    /// Interval between health sweeps
    pub health_check_interval_ms: u64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            enable_health_checks: true,
            enable_load_balancing: true,
            enable_circuit_breaker: true,
            enable_metrics: true,
            enable_caching: true,
            monitoring_interval_ms: MONITORING_INTERVAL_SECS * 1000,
            health_check_interval_ms: HEALTH_CHECK_INTERVAL_SECS * 1000,
        }
    }
}

impl MeshOptions {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Partial update of [`MeshOptions`] applied at runtime
///
/// Unknown keys are rejected when deserializing, so an update built from an
/// operator-supplied map cannot silently ignore a misspelled option.
///
/// Intervals are accepted in whole seconds (`monitoring_interval`,
/// `health_check_interval`) or in milliseconds (the `_ms` keys). The
/// millisecond key wins when both are given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshConfigUpdate {
    pub enable_health_checks: Option<bool>,
    pub enable_load_balancing: Option<bool>,
    pub enable_circuit_breaker: Option<bool>,
    pub enable_metrics: Option<bool>,
    pub enable_caching: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_interval: Option<u64>,
    pub monitoring_interval_ms: Option<u64>,
    pub health_check_interval_ms: Option<u64>,
}

impl MeshConfigUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_health_checks(mut self, enabled: bool) -> Self {
        self.enable_health_checks = Some(enabled);
        self
    }

    pub fn enable_load_balancing(mut self, enabled: bool) -> Self {
        self.enable_load_balancing = Some(enabled);
        self
    }

    pub fn enable_circuit_breaker(mut self, enabled: bool) -> Self {
        self.enable_circuit_breaker = Some(enabled);
        self
    }

    pub fn enable_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = Some(enabled);
        self
    }

    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = Some(enabled);
        self
    }

    pub fn monitoring_interval(mut self, interval: Duration) -> Self {
        self.monitoring_interval_ms = Some(duration_ms(interval));
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = Some(duration_ms(interval));
        self
    }

    /// True when no option is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `options`, returning the names of the options that changed
    pub fn apply(&self, options: &mut MeshOptions) -> Vec<String> {
        let mut changed = Vec::new();
        apply_field(
            &mut changed,
            "enable_health_checks",
            self.enable_health_checks,
            &mut options.enable_health_checks,
        );
        apply_field(
            &mut changed,
            "enable_load_balancing",
            self.enable_load_balancing,
            &mut options.enable_load_balancing,
        );
        apply_field(
            &mut changed,
            "enable_circuit_breaker",
            self.enable_circuit_breaker,
            &mut options.enable_circuit_breaker,
        );
        apply_field(
            &mut changed,
            "enable_metrics",
            self.enable_metrics,
            &mut options.enable_metrics,
        );
        apply_field(
            &mut changed,
            "enable_caching",
            self.enable_caching,
            &mut options.enable_caching,
        );
        apply_field(
            &mut changed,
            "monitoring_interval",
            interval_ms(self.monitoring_interval_ms, self.monitoring_interval),
            &mut options.monitoring_interval_ms,
        );
        apply_field(
            &mut changed,
            "health_check_interval",
            interval_ms(self.health_check_interval_ms, self.health_check_interval),
            &mut options.health_check_interval_ms,
        );
        changed
    }
}

fn apply_field<T: PartialEq>(changed: &mut Vec<String>, name: &str, value: Option<T>, target: &mut T) {
    if let Some(value) = value {
        if *target != value {
            *target = value;
            changed.push(name.to_string());
        }
    }
}

fn interval_ms(millis: Option<u64>, secs: Option<u64>) -> Option<u64> {
    millis.or_else(|| secs.map(|secs| secs.saturating_mul(1000)))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
