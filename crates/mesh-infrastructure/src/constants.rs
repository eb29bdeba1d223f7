//! Infrastructure layer constants
//!
//! Defaults used by configuration types and components. Domain limits are
//! defined in `mesh_domain::constants`.

use std::time::Duration;

// ============================================================================
// CONFIGURATION CONSTANTS
// ============================================================================

/// Default configuration file name
pub const DEFAULT_CONFIG_FILENAME: &str = "mesh.toml";

/// Default configuration directory name
pub const DEFAULT_CONFIG_DIR: &str = "mesh";

/// Environment variable prefix for configuration (`MESH__SECTION__KEY`)
pub const CONFIG_ENV_PREFIX: &str = "MESH";

/// Environment variable overriding the log filter
pub const LOG_FILTER_ENV: &str = "MESH_LOG";

// ============================================================================
// CIRCUIT BREAKER CONSTANTS
// ============================================================================

/// Consecutive failures that open a breaker
pub const CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Consecutive half-open successes that close a breaker
pub const CIRCUIT_BREAKER_SUCCESS_THRESHOLD: u32 = 2;

/// Time an open breaker waits before admitting a probe
pub const CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECS: u64 = 30;

/// Outbound call timeout
pub const CALL_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// CACHE CONSTANTS
// ============================================================================

/// Default response cache TTL
pub const CACHE_DEFAULT_TTL_SECS: u64 = 300;

/// Default response cache capacity (entries)
pub const CACHE_DEFAULT_MAX_ENTRIES: usize = 1000;

/// Interval between expired-entry sweeps
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Interval between cache snapshots when persistence is enabled
pub const CACHE_SNAPSHOT_INTERVAL_SECS: u64 = 300;

// ============================================================================
// DISPATCH CONSTANTS
// ============================================================================

/// Global limit on in-flight outbound calls
pub const MAX_CONCURRENT_REQUESTS: usize = 100;

/// Time a caller may wait for a concurrency slot
pub const SLOT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// HEALTH CONSTANTS
// ============================================================================

/// Interval between health sweeps
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;

/// Timeout of a single probe
pub const HEALTH_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Probes slower than this classify the endpoint as degraded
pub const HEALTH_DEGRADED_THRESHOLD_MS: u64 = 1_000;

/// Probe samples kept for the average response time
pub const HEALTH_RESPONSE_WINDOW: usize = 20;

// ============================================================================
// EVENTS & METRICS CONSTANTS
// ============================================================================

/// Events retained in the bus history ring
pub const EVENT_HISTORY_CAPACITY: usize = 1000;

/// Alerts retained by the alerting observer
pub const ALERT_HISTORY_CAPACITY: usize = 100;

/// Interval between mesh-wide gauge refreshes
pub const MONITORING_INTERVAL_SECS: u64 = 60;

/// Metric name prefix
pub const METRICS_PREFIX: &str = "mesh";

/// Histogram bucket upper bounds for response times, in seconds
pub const RESPONSE_TIME_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

// ============================================================================
// LOGGING CONSTANTS
// ============================================================================

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Graceful shutdown budget for background tasks
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
