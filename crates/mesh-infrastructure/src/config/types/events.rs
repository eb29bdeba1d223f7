//! Event bus configuration types

use crate::constants::{ALERT_HISTORY_CAPACITY, EVENT_HISTORY_CAPACITY};
use serde::{Deserialize, Serialize};

/// Event bus and built-in observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events retained in the history ring (0 disables history)
    pub history_capacity: usize,
    /// Subscribe the structured logger
    pub structured_logging: bool,
    /// Subscribe the alerting observer
    pub alerting: bool,
    /// Alerts retained by the alerting observer
    pub alert_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_capacity: EVENT_HISTORY_CAPACITY,
            structured_logging: true,
            alerting: true,
            alert_capacity: ALERT_HISTORY_CAPACITY,
        }
    }
}
