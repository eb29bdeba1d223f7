//! Mesh Observer Port
//!
//! Observers subscribe to the event bus and receive every published
//! [`MeshEvent`] synchronously, in subscription order.

use crate::error::Result;
use crate::events::MeshEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed set of roles an observer can play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverRole {
    Logging,
    Metrics,
    Alerting,
}

impl fmt::Display for ObserverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logging => write!(f, "logging"),
            Self::Metrics => write!(f, "metrics"),
            Self::Alerting => write!(f, "alerting"),
        }
    }
}

/// Event bus subscriber
///
/// `update` runs on the publisher's task and must not block. An `Err` (or a
/// panic) is logged by the bus and never reaches the publisher. Service
/// events may be delivered while the service's registry entry is held, so
/// `update` must not register or unregister services itself.
pub trait MeshObserver: Send + Sync {
    /// Name used in logs and for unsubscribing
    fn name(&self) -> &str;

    /// Role this observer plays
    fn role(&self) -> ObserverRole;

    /// Handle one event
    fn update(&self, event: &MeshEvent) -> Result<()>;
}
