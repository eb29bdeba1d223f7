//! Endpoint selection for one service

use crate::config::LoadBalancingPolicy;
use mesh_domain::Endpoint;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
struct EndpointSlot {
    endpoint: Endpoint,
    active: AtomicUsize,
    eligible: AtomicBool,
}

/// A selected endpoint; counts as one active connection until dropped
#[derive(Debug)]
pub struct EndpointLease {
    index: usize,
    slot: Arc<EndpointSlot>,
    generation: u64,
}

impl EndpointLease {
    pub fn endpoint(&self) -> &Endpoint {
        &self.slot.endpoint
    }

    /// Position of the endpoint in the descriptor's endpoint list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Registration the endpoint was selected from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn stamped(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        self.slot.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Chooses among a service's endpoints according to a policy
#[derive(Debug)]
pub struct EndpointBalancer {
    slots: Vec<Arc<EndpointSlot>>,
    cursor: AtomicUsize,
}

impl EndpointBalancer {
    pub fn new(endpoints: &[Endpoint]) -> Self {
        Self {
            slots: endpoints
                .iter()
                .map(|endpoint| {
                    Arc::new(EndpointSlot {
                        endpoint: endpoint.clone(),
                        active: AtomicUsize::new(0),
                        eligible: AtomicBool::new(true),
                    })
                })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pick an endpoint; `None` when no endpoint is eligible
    ///
    /// With `balance` off the first eligible endpoint is always chosen.
    /// With `skip_ineligible` off every endpoint is considered eligible.
    pub fn select(
        &self,
        policy: LoadBalancingPolicy,
        balance: bool,
        skip_ineligible: bool,
    ) -> Option<EndpointLease> {
        let candidates: Vec<usize> = (0..self.slots.len())
            .filter(|&i| !skip_ineligible || self.slots[i].eligible.load(Ordering::Acquire))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let chosen = if balance {
            match policy {
                LoadBalancingPolicy::RoundRobin => {
                    let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                    candidates[turn % candidates.len()]
                }
                LoadBalancingPolicy::LeastConnections => candidates
                    .iter()
                    .copied()
                    .min_by_key(|&i| self.slots[i].active.load(Ordering::Acquire))
                    .unwrap_or(candidates[0]),
                LoadBalancingPolicy::Random => {
                    candidates[rand::rng().random_range(0..candidates.len())]
                }
            }
        } else {
            candidates[0]
        };

        let slot = Arc::clone(&self.slots[chosen]);
        slot.active.fetch_add(1, Ordering::AcqRel);
        Some(EndpointLease {
            index: chosen,
            slot,
            generation: 0,
        })
    }

    /// Mark an endpoint (by `host:port`) as eligible or not; false if unknown
    pub fn set_eligible(&self, address: &str, eligible: bool) -> bool {
        let mut found = false;
        for slot in self.slots.iter().filter(|s| s.endpoint.address() == address) {
            slot.eligible.store(eligible, Ordering::Release);
            found = true;
        }
        found
    }

    /// `(address, active connections)` per endpoint, in endpoint order
    pub fn active_connections(&self) -> Vec<(String, usize)> {
        self.slots
            .iter()
            .map(|s| (s.endpoint.address(), s.active.load(Ordering::Acquire)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
