use crate::value_objects::{CircuitState, HealthStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened, with the data specific to each event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEventKind {
    /// A service entered the registry
    ServiceRegistered {
        /// Number of endpoints registered
        endpoints: usize,
    },
    /// A service and all its derived state were removed
    ServiceUnregistered,
    /// A dispatched call produced a response
    RequestCompleted {
        method: String,
        path: String,
        status_code: u16,
        response_time_ms: f64,
        cached: bool,
    },
    /// A dispatched call failed
    RequestFailed {
        method: String,
        path: String,
        error: String,
        /// True when the call never reached the network (validation, breaker, limiter)
        rejected: bool,
    },
    /// A circuit breaker changed state
    BreakerStateChanged { from: CircuitState, to: CircuitState },
    /// The health monitor reclassified a service
    HealthChanged { from: HealthStatus, to: HealthStatus },
    /// The response cache evicted an entry to make room
    CacheEvicted { key: String },
    /// Background monitoring started
    MeshStarted,
    /// Background monitoring stopped
    MeshStopped,
    /// Runtime options were changed
    ConfigUpdated { changes: Vec<String> },
}

impl MeshEventKind {
    /// Stable snake_case name, used as a metric label and log field
    pub fn name(&self) -> &'static str {
        match self {
            Self::ServiceRegistered { .. } => "service_registered",
            Self::ServiceUnregistered => "service_unregistered",
            Self::RequestCompleted { .. } => "request_completed",
            Self::RequestFailed { .. } => "request_failed",
            Self::BreakerStateChanged { .. } => "breaker_state_changed",
            Self::HealthChanged { .. } => "health_changed",
            Self::CacheEvicted { .. } => "cache_evicted",
            Self::MeshStarted => "mesh_started",
            Self::MeshStopped => "mesh_stopped",
            Self::ConfigUpdated { .. } => "config_updated",
        }
    }
}

/// An event published on the mesh event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEvent {
    pub id: Uuid,
    /// Service the event concerns; `None` for mesh-wide events
    pub service_id: Option<String>,
    #[serde(flatten)]
    pub kind: MeshEventKind,
    pub timestamp: DateTime<Utc>,
}

impl MeshEvent {
    /// Event about a specific service
    pub fn for_service<S: Into<String>>(service_id: S, kind: MeshEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id: Some(service_id.into()),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Mesh-wide event
    pub fn mesh(kind: MeshEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}
