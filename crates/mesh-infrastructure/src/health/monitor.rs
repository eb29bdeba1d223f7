//! Periodic endpoint probing
//!
//! A sweep probes every endpoint of every registered service concurrently,
//! classifies each probe, folds the results into the service's
//! [`HealthRecord`], updates endpoint eligibility for the load balancer and
//! feeds the circuit breaker.

use super::record::{EndpointHealth, HealthRecord, HealthSummary};
use crate::config::HealthConfig;
use crate::events::EventBus;
use crate::resilience::{BreakerTransition, CircuitBreakerRegistry};
use crate::routing::ServiceRegistry;
use crate::utils::{ScheduledTask, TimedOperation};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use mesh_domain::error::{Error, Result};
use mesh_domain::ports::ServiceTransport;
use mesh_domain::{Endpoint, HealthStatus, MeshEvent, MeshEventKind, TimeoutOperation};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Background health monitor
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    transport: Arc<dyn ServiceTransport>,
    bus: Arc<EventBus>,
    config: HealthConfig,
    records: DashMap<String, HealthRecord>,
    feed_breaker: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        transport: Arc<dyn ServiceTransport>,
        bus: Arc<EventBus>,
        config: HealthConfig,
    ) -> Self {
        let feed_breaker = AtomicBool::new(config.feed_circuit_breaker);
        Self {
            registry,
            breakers,
            transport,
            bus,
            config,
            records: DashMap::new(),
            feed_breaker,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Enable or disable feeding probe outcomes into circuit breakers
    pub fn set_breaker_feed(&self, enabled: bool) {
        self.feed_breaker
            .store(enabled && self.config.feed_circuit_breaker, Ordering::Release);
    }

    /// Start sweeping every `interval`
    pub fn start(self: &Arc<Self>, interval: Duration) -> ScheduledTask {
        let monitor = Arc::clone(self);
        info!(interval_ms = interval.as_millis(), "Health monitor started");
        ScheduledTask::spawn("health-monitor", interval, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.check_now().await;
                Ok(())
            }
        })
    }

    /// Probe every registered service once; returns how many were checked
    pub async fn check_now(&self) -> usize {
        let ids = self.registry.ids();
        let outcomes = join_all(ids.iter().map(|id| self.check_service(id))).await;

        let mut checked = 0;
        for (id, outcome) in ids.iter().zip(outcomes) {
            match outcome {
                Ok(_) => checked += 1,
                // Unregistered while the sweep was running
                Err(Error::ServiceNotFound { .. }) => {
                    debug!(service_id = %id, "Skipped health check of removed service");
                }
                Err(e) => warn!(service_id = %id, error = %e, "Health check failed"),
            }
        }
        checked
    }

    /// Probe one service and record the outcome
    ///
    /// Results are dropped with `ServiceNotFound` if the registration that
    /// was checked is replaced or removed before they land.
    pub async fn check_service(&self, service_id: &str) -> Result<HealthStatus> {
        let registration = self.registry.registration(service_id)?;

        let probes = join_all(
            registration
                .descriptor
                .endpoints
                .iter()
                .map(|endpoint| self.probe_endpoint(endpoint)),
        )
        .await;
        let status = classify_service(&probes);
        let eligibility: Vec<(String, bool)> = probes
            .iter()
            .map(|p| (p.address.clone(), p.status.is_operational()))
            .collect();
        let all_failed = probes.iter().all(|p| p.status == HealthStatus::Unhealthy);

        if !self
            .registry
            .mark_endpoints(service_id, registration.generation, &eligibility)
        {
            return Err(Error::service_not_found(service_id));
        }

        self.registry
            .with_registration(service_id, registration.generation, |_| {
                let previous = self
                    .records
                    .entry(service_id.to_string())
                    .or_insert_with(|| HealthRecord::new(service_id))
                    .apply(status, probes, Utc::now());

                if self.feed_breaker.load(Ordering::Acquire) {
                    if let Some(breaker) = self.breakers.get(service_id) {
                        if let Some(transition) = breaker.record_health(!all_failed) {
                            self.publish_transition(transition);
                        }
                    }
                }

                if previous != status {
                    info!(
                        service_id = %service_id,
                        from = %previous,
                        to = %status,
                        "Service health changed"
                    );
                    self.bus.publish(MeshEvent::for_service(
                        service_id,
                        MeshEventKind::HealthChanged {
                            from: previous,
                            to: status,
                        },
                    ));
                }
            })
            .ok_or_else(|| Error::service_not_found(service_id))?;

        Ok(status)
    }

    async fn probe_endpoint(&self, endpoint: &Endpoint) -> EndpointHealth {
        let timeout = self.config.probe_timeout();
        let timer = TimedOperation::start();
        let outcome = tokio::time::timeout(timeout, self.transport.probe(endpoint, timeout))
            .await
            .unwrap_or_else(|_| Err(Error::timeout(TimeoutOperation::HealthProbe, timeout)));
        let elapsed = timer.elapsed();

        let (status, response_time_ms, status_code, error) = match outcome {
            Ok(response) => {
                let status = if response.status_code >= 500 {
                    HealthStatus::Unhealthy
                } else if response.status_code >= 400 || elapsed > self.config.degraded_threshold()
                {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                (
                    status,
                    Some(elapsed.as_secs_f64() * 1000.0),
                    Some(response.status_code),
                    None,
                )
            }
            Err(e) => (HealthStatus::Unhealthy, None, None, Some(e.to_string())),
        };

        debug!(
            endpoint = %endpoint.address(),
            status = %status,
            elapsed_ms = elapsed.as_millis(),
            "Endpoint probed"
        );

        EndpointHealth {
            address: endpoint.address(),
            status,
            response_time_ms,
            status_code,
            error,
            checked_at: Utc::now(),
        }
    }

    fn publish_transition(&self, transition: BreakerTransition) {
        self.bus.publish(MeshEvent::for_service(
            transition.service_id,
            MeshEventKind::BreakerStateChanged {
                from: transition.from,
                to: transition.to,
            },
        ));
    }

    /// Current status; `Unknown` until the first sweep
    pub fn status(&self, service_id: &str) -> Result<HealthStatus> {
        if !self.registry.contains(service_id) {
            return Err(Error::service_not_found(service_id));
        }
        Ok(self
            .records
            .get(service_id)
            .map_or(HealthStatus::Unknown, |record| record.status))
    }

    /// Copy of the full record
    pub fn record(&self, service_id: &str) -> Option<HealthRecord> {
        self.records.get(service_id).map(|record| record.clone())
    }

    pub fn summary(&self, service_id: &str) -> Result<HealthSummary> {
        if !self.registry.contains(service_id) {
            return Err(Error::service_not_found(service_id));
        }
        Ok(self.records.get(service_id).map_or_else(
            || HealthRecord::new(service_id).summary(),
            |record| record.summary(),
        ))
    }

    /// Drop the record of an unregistered service
    pub fn remove(&self, service_id: &str) -> Option<HealthRecord> {
        self.records.remove(service_id).map(|(_, record)| record)
    }

    /// `(healthy, unhealthy)` service counts from the latest sweep
    pub fn counts(&self) -> (usize, usize) {
        self.records
            .iter()
            .fold((0, 0), |(healthy, unhealthy), record| match record.status {
                HealthStatus::Healthy => (healthy + 1, unhealthy),
                HealthStatus::Unhealthy => (healthy, unhealthy + 1),
                HealthStatus::Degraded | HealthStatus::Unknown => (healthy, unhealthy),
            })
    }
}

/// All healthy → healthy; none operational → unhealthy; otherwise degraded
fn classify_service(probes: &[EndpointHealth]) -> HealthStatus {
    if probes.is_empty() {
        HealthStatus::Unknown
    } else if probes.iter().all(|p| p.status.is_healthy()) {
        HealthStatus::Healthy
    } else if probes.iter().any(|p| p.status.is_operational()) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}
