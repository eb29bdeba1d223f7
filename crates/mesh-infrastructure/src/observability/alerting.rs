//! Alerting observer
//!
//! Turns breaker openings, unhealthy services and failed requests into
//! alerts kept in a bounded buffer for operators to poll.

use chrono::{DateTime, Utc};
use mesh_domain::error::Result;
use mesh_domain::ports::{MeshObserver, ObserverRole};
use mesh_domain::{CircuitState, HealthStatus, MeshEvent, MeshEventKind};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// One raised alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub service_id: Option<String>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Collects alerts from mesh events
pub struct AlertingObserver {
    alerts: Mutex<VecDeque<Alert>>,
    capacity: usize,
}

impl AlertingObserver {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Alerts raised so far, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Remove and return every alert
    pub fn drain(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn raise(&self, severity: AlertSeverity, service_id: Option<&str>, message: String) {
        warn!(
            severity = ?severity,
            service_id = service_id.unwrap_or("-"),
            "{message}"
        );
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        if alerts.len() >= self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(Alert {
            severity,
            service_id: service_id.map(str::to_string),
            message,
            raised_at: Utc::now(),
        });
    }
}

impl MeshObserver for AlertingObserver {
    fn name(&self) -> &str {
        "alerting"
    }

    fn role(&self) -> ObserverRole {
        ObserverRole::Alerting
    }

    fn update(&self, event: &MeshEvent) -> Result<()> {
        let service = event.service_id.as_deref();
        let label = service.unwrap_or("unknown");

        match &event.kind {
            MeshEventKind::BreakerStateChanged {
                to: CircuitState::Open,
                ..
            } => self.raise(
                AlertSeverity::Critical,
                service,
                format!("Circuit breaker opened for {label}"),
            ),
            MeshEventKind::HealthChanged {
                to: HealthStatus::Unhealthy,
                ..
            } => self.raise(
                AlertSeverity::Critical,
                service,
                format!("Service {label} is unhealthy"),
            ),
            MeshEventKind::HealthChanged {
                to: HealthStatus::Degraded,
                ..
            } => self.raise(
                AlertSeverity::Warning,
                service,
                format!("Service {label} is degraded"),
            ),
            MeshEventKind::RequestFailed {
                method,
                path,
                error,
                rejected: false,
            } => self.raise(
                AlertSeverity::Warning,
                service,
                format!("{method} {path} on {label} failed: {error}"),
            ),
            _ => {}
        }
        Ok(())
    }
}
