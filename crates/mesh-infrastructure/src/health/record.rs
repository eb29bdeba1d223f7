//! Health records kept per service

use crate::constants::HEALTH_RESPONSE_WINDOW;
use chrono::{DateTime, Utc};
use mesh_domain::HealthStatus;
use serde::Serialize;
use std::collections::VecDeque;

/// Outcome of probing one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointHealth {
    /// `host:port`
    pub address: String,
    pub status: HealthStatus,
    /// Probe round-trip time; `None` when no response was obtained
    pub response_time_ms: Option<f64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Latest health view of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub service_id: String,
    pub status: HealthStatus,
    pub last_check_time: Option<DateTime<Utc>>,
    /// Sweeps in a row that classified the service unhealthy
    pub consecutive_failures: u32,
    /// Mean probe time over the recent window
    pub average_response_time_ms: f64,
    pub endpoints: Vec<EndpointHealth>,
    pub total_probes: u64,
    pub failed_probes: u64,
    #[serde(skip)]
    recent: VecDeque<f64>,
}

impl HealthRecord {
    pub fn new<S: Into<String>>(service_id: S) -> Self {
        Self {
            service_id: service_id.into(),
            status: HealthStatus::Unknown,
            last_check_time: None,
            consecutive_failures: 0,
            average_response_time_ms: 0.0,
            endpoints: Vec::new(),
            total_probes: 0,
            failed_probes: 0,
            recent: VecDeque::with_capacity(HEALTH_RESPONSE_WINDOW),
        }
    }

    /// Fold one sweep into the record, returning the previous status
    pub fn apply(
        &mut self,
        status: HealthStatus,
        endpoints: Vec<EndpointHealth>,
        checked_at: DateTime<Utc>,
    ) -> HealthStatus {
        for probe in &endpoints {
            self.total_probes += 1;
            if probe.status == HealthStatus::Unhealthy {
                self.failed_probes += 1;
            }
            if let Some(ms) = probe.response_time_ms {
                if self.recent.len() >= HEALTH_RESPONSE_WINDOW {
                    self.recent.pop_front();
                }
                self.recent.push_back(ms);
            }
        }
        if !self.recent.is_empty() {
            self.average_response_time_ms =
                self.recent.iter().sum::<f64>() / self.recent.len() as f64;
        }

        if status == HealthStatus::Unhealthy {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }

        self.endpoints = endpoints;
        self.last_check_time = Some(checked_at);
        std::mem::replace(&mut self.status, status)
    }

    /// Share of all probes that failed
    pub fn error_rate(&self) -> f64 {
        if self.total_probes == 0 {
            0.0
        } else {
            self.failed_probes as f64 / self.total_probes as f64
        }
    }

    pub fn summary(&self) -> HealthSummary {
        let total_endpoints = self.endpoints.len();
        let healthy_endpoints = self
            .endpoints
            .iter()
            .filter(|e| e.status.is_healthy())
            .count();
        HealthSummary {
            service_id: self.service_id.clone(),
            status: self.status,
            healthy_endpoints,
            total_endpoints,
            healthy_ratio: if total_endpoints == 0 {
                0.0
            } else {
                healthy_endpoints as f64 / total_endpoints as f64
            },
            average_response_time_ms: self.average_response_time_ms,
            error_rate: self.error_rate(),
            consecutive_failures: self.consecutive_failures,
            last_check_time: self.last_check_time,
        }
    }
}

/// Condensed health view returned by the mesh facade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub service_id: String,
    pub status: HealthStatus,
    pub healthy_endpoints: usize,
    pub total_endpoints: usize,
    pub healthy_ratio: f64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub last_check_time: Option<DateTime<Utc>>,
}
