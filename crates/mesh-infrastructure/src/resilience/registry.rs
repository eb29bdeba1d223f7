//! One circuit breaker per service

use super::circuit_breaker::{BreakerTransition, CircuitBreaker, CircuitBreakerSnapshot};
use crate::config::CircuitBreakerConfig;
use dashmap::DashMap;
use std::sync::Arc;

/// Holds the live breaker of every registered service
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `service_id`, created on first use
    pub fn get_or_create(&self, service_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service_id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.breakers
                .entry(service_id.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(service_id, self.config.clone())))
                .value(),
        )
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(service_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, service_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.remove(service_id).map(|(_, breaker)| breaker)
    }

    /// Force the breaker closed; `None` if the service has no breaker or it was already closed
    pub fn reset(&self, service_id: &str) -> Option<BreakerTransition> {
        self.get(service_id).and_then(|breaker| breaker.reset())
    }

    /// Snapshots of all breakers, ordered by service id
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        all.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
