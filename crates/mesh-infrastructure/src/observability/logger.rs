//! Structured logger observer

use mesh_domain::error::Result;
use mesh_domain::ports::{MeshObserver, ObserverRole};
use mesh_domain::{MeshEvent, MeshEventKind};
use tracing::{debug, info, warn};

/// Emits one tracing event per mesh event with structured fields
#[derive(Debug, Default)]
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn new() -> Self {
        Self
    }
}

impl MeshObserver for StructuredLogger {
    fn name(&self) -> &str {
        "structured-logger"
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Logging
    }

    fn update(&self, event: &MeshEvent) -> Result<()> {
        let service = event.service_id.as_deref().unwrap_or("-");
        let event_id = event.id.to_string();

        match &event.kind {
            MeshEventKind::RequestCompleted {
                method,
                path,
                status_code,
                response_time_ms,
                cached,
            } => debug!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                method = %method,
                path = %path,
                status_code,
                response_time_ms,
                cached,
                "Request completed"
            ),
            MeshEventKind::RequestFailed {
                method,
                path,
                error,
                rejected,
            } => warn!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                method = %method,
                path = %path,
                error = %error,
                rejected,
                "Request failed"
            ),
            MeshEventKind::BreakerStateChanged { from, to } => info!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                from = %from,
                to = %to,
                "Circuit breaker changed state"
            ),
            MeshEventKind::HealthChanged { from, to } => info!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                from = %from,
                to = %to,
                "Service health changed"
            ),
            MeshEventKind::CacheEvicted { key } => debug!(
                event = event.name(),
                event_id = %event_id,
                key = %key,
                "Cache entry evicted"
            ),
            MeshEventKind::ServiceRegistered { endpoints } => info!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                endpoints,
                "Service registered"
            ),
            MeshEventKind::ConfigUpdated { changes } => info!(
                event = event.name(),
                event_id = %event_id,
                changes = ?changes,
                "Mesh configuration updated"
            ),
            MeshEventKind::ServiceUnregistered
            | MeshEventKind::MeshStarted
            | MeshEventKind::MeshStopped => info!(
                event = event.name(),
                event_id = %event_id,
                service_id = service,
                "Mesh event"
            ),
        }
        Ok(())
    }
}
