//! Health monitoring
//!
//! Out-of-band probing of every registered endpoint. The monitor is the
//! only writer of health records; the dispatcher reads the outcome through
//! endpoint eligibility and the circuit breaker.

pub mod monitor;
pub mod record;

pub use monitor::HealthMonitor;
pub use record::{EndpointHealth, HealthRecord, HealthSummary};
