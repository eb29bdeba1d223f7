//! Service registry
//!
//! Holds service descriptors keyed by id in a sharded map, so lookups and
//! registrations for different services do not contend. Readers get
//! `Arc` snapshots that stay valid while the registry changes.
//!
//! Every registration gets a fresh generation number. Work started against
//! one registration can check, through
//! [`with_registration`](ServiceRegistry::with_registration), that the id
//! has not since been unregistered or registered again.

use super::balancer::{EndpointBalancer, EndpointLease};
use crate::config::{LoadBalancingConfig, LoadBalancingPolicy};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mesh_domain::ServiceDescriptor;
use mesh_domain::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

struct RegisteredService {
    descriptor: Arc<ServiceDescriptor>,
    balancer: EndpointBalancer,
    generation: u64,
}

/// A descriptor together with the registration it belongs to
#[derive(Debug, Clone)]
pub struct Registration {
    pub descriptor: Arc<ServiceDescriptor>,
    pub generation: u64,
}

/// Registry of the services known to the mesh
pub struct ServiceRegistry {
    services: DashMap<String, RegisteredService>,
    policy: LoadBalancingPolicy,
    skip_unhealthy: bool,
    balancing_enabled: AtomicBool,
    next_generation: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(config: &LoadBalancingConfig) -> Self {
        Self {
            services: DashMap::new(),
            policy: config.policy,
            skip_unhealthy: config.skip_unhealthy,
            balancing_enabled: AtomicBool::new(true),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn policy(&self) -> LoadBalancingPolicy {
        self.policy
    }

    /// Toggle balancing; when off every call goes to the first eligible endpoint
    pub fn set_balancing_enabled(&self, enabled: bool) {
        self.balancing_enabled.store(enabled, Ordering::Release);
    }

    /// Add a service
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<Arc<ServiceDescriptor>> {
        descriptor.validate()?;

        match self.services.entry(descriptor.id.clone()) {
            Entry::Occupied(_) => Err(Error::already_registered(descriptor.id)),
            Entry::Vacant(vacant) => {
                let descriptor = Arc::new(descriptor);
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                info!(
                    service_id = %descriptor.id,
                    endpoints = descriptor.endpoints.len(),
                    generation,
                    "Service registered"
                );
                vacant.insert(RegisteredService {
                    balancer: EndpointBalancer::new(&descriptor.endpoints),
                    descriptor: Arc::clone(&descriptor),
                    generation,
                });
                Ok(descriptor)
            }
        }
    }

    /// Remove a service
    pub fn unregister(&self, service_id: &str) -> Result<Arc<ServiceDescriptor>> {
        self.unregister_with(service_id, |_| {})
    }

    /// Remove a service, running `cleanup` before the entry disappears
    ///
    /// `cleanup` runs while the entry is locked: lookups of the same id
    /// through [`with_service`](Self::with_service) wait until it has
    /// finished, so derived state is removed atomically with the entry.
    /// `cleanup` must not call back into this registry.
    pub fn unregister_with<F>(&self, service_id: &str, cleanup: F) -> Result<Arc<ServiceDescriptor>>
    where
        F: FnOnce(&ServiceDescriptor),
    {
        match self.services.entry(service_id.to_string()) {
            Entry::Vacant(_) => Err(Error::service_not_found(service_id)),
            Entry::Occupied(occupied) => {
                cleanup(&occupied.get().descriptor);
                let (_, removed) = occupied.remove_entry();
                info!(service_id = %service_id, "Service unregistered");
                Ok(removed.descriptor)
            }
        }
    }

    /// Descriptor snapshot for `service_id`
    pub fn get(&self, service_id: &str) -> Result<Arc<ServiceDescriptor>> {
        self.services
            .get(service_id)
            .map(|entry| Arc::clone(&entry.descriptor))
            .ok_or_else(|| Error::service_not_found(service_id))
    }

    /// Descriptor and generation of the current registration of `service_id`
    pub fn registration(&self, service_id: &str) -> Result<Registration> {
        self.services
            .get(service_id)
            .map(|entry| Registration {
                descriptor: Arc::clone(&entry.descriptor),
                generation: entry.generation,
            })
            .ok_or_else(|| Error::service_not_found(service_id))
    }

    /// Run `f` while registration `generation` of `service_id` is held
    ///
    /// Returns `None` if the service was unregistered, or registered again
    /// under a newer generation. Like [`with_service`](Self::with_service),
    /// `f` runs under the entry lock and must not call back into this
    /// registry.
    pub fn with_registration<R>(
        &self,
        service_id: &str,
        generation: u64,
        f: impl FnOnce(&ServiceDescriptor) -> R,
    ) -> Option<R> {
        self.services
            .get(service_id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| f(&entry.descriptor))
    }

    /// Run `f` against a registered service while its entry is held
    ///
    /// Returns `None` if the service is not registered.
    pub fn with_service<R>(&self, service_id: &str, f: impl FnOnce(&ServiceDescriptor) -> R) -> Option<R> {
        self.services
            .get(service_id)
            .map(|entry| f(&entry.descriptor))
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    /// Choose an endpoint for `service_id` with the configured policy
    pub fn resolve(&self, service_id: &str) -> Result<EndpointLease> {
        let entry = self
            .services
            .get(service_id)
            .ok_or_else(|| Error::service_not_found(service_id))?;

        let lease = entry
            .balancer
            .select(
                self.policy,
                self.balancing_enabled.load(Ordering::Acquire),
                self.skip_unhealthy,
            )
            .ok_or_else(|| {
                Error::load_balancing(service_id, "no eligible endpoint (all marked unhealthy)")
            })?;

        debug!(
            service_id = %service_id,
            endpoint = %lease.endpoint().address(),
            policy = %self.policy,
            "Endpoint resolved"
        );
        Ok(lease.stamped(entry.generation))
    }

    /// Mark one endpoint (by `host:port`) eligible or not for selection
    pub fn set_endpoint_eligible(&self, service_id: &str, address: &str, eligible: bool) -> bool {
        self.services
            .get(service_id)
            .is_some_and(|entry| entry.balancer.set_eligible(address, eligible))
    }

    /// Apply `(address, eligible)` marks if registration `generation` is current
    ///
    /// Returns false, changing nothing, when the registration is gone.
    pub fn mark_endpoints(
        &self,
        service_id: &str,
        generation: u64,
        marks: &[(String, bool)],
    ) -> bool {
        let Some(entry) = self
            .services
            .get(service_id)
            .filter(|entry| entry.generation == generation)
        else {
            return false;
        };
        for (address, eligible) in marks {
            entry.balancer.set_eligible(address, *eligible);
        }
        true
    }

    /// `(address, active connections)` per endpoint of `service_id`
    pub fn active_connections(&self, service_id: &str) -> Result<Vec<(String, usize)>> {
        self.services
            .get(service_id)
            .map(|entry| entry.balancer.active_connections())
            .ok_or_else(|| Error::service_not_found(service_id))
    }

    /// Immutable snapshot of all descriptors, ordered by id
    pub fn list(&self) -> Vec<Arc<ServiceDescriptor>> {
        let mut all: Vec<_> = self
            .services
            .iter()
            .map(|entry| Arc::clone(&entry.descriptor))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Iterate over a snapshot of all descriptors
    pub fn iter(&self) -> impl Iterator<Item = Arc<ServiceDescriptor>> {
        self.list().into_iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.list().iter().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(&LoadBalancingConfig::default())
    }
}
