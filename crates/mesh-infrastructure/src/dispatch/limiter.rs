//! Bounded concurrency for outbound calls
//!
//! A global semaphore caps in-flight calls across the mesh; an optional
//! per-service semaphore keeps one busy dependency from taking every slot.
//! Waiting parks the task. Slots are released when the [`SlotPermit`] is
//! dropped, on every exit path.

use crate::config::DispatcherConfig;
use dashmap::DashMap;
use mesh_domain::error::{Error, Result};
use mesh_domain::TimeoutOperation;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicU64,
    timed_out: AtomicU64,
}

/// Permission to run one call; holds the slot until dropped
#[derive(Debug)]
pub struct SlotPermit {
    _service: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Limiter counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub limit: usize,
    pub available: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub acquired: u64,
    pub timed_out: u64,
}

/// Global and per-service slot limiter
pub struct ConcurrencyLimiter {
    global: Arc<Semaphore>,
    limit: usize,
    per_service_limit: Option<usize>,
    per_service: DashMap<String, Arc<Semaphore>>,
    acquire_timeout: Duration,
    counters: Arc<Counters>,
}

impl ConcurrencyLimiter {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self::with_limits(
            config.max_concurrent_requests,
            config.max_concurrent_per_service,
            config.acquire_timeout(),
        )
    }

    pub fn with_limits(
        limit: usize,
        per_service_limit: Option<usize>,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            global: Arc::new(Semaphore::new(limit)),
            limit,
            per_service_limit,
            per_service: DashMap::new(),
            acquire_timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// Wait for a slot for `service_id`
    ///
    /// Fails with `AsyncTimeout { operation: SlotAcquire }` when no slot
    /// frees up within the acquire timeout.
    pub async fn acquire(&self, service_id: &str) -> Result<SlotPermit> {
        let service = self.service_semaphore(service_id);
        let global = Arc::clone(&self.global);

        let acquired = tokio::time::timeout(self.acquire_timeout, async move {
            // Service slot first so a saturated service does not pin global slots
            let service_permit = match service {
                Some(semaphore) => Some(semaphore.acquire_owned().await?),
                None => None,
            };
            let global_permit = global.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((service_permit, global_permit))
        })
        .await;

        match acquired {
            Ok(Ok((service_permit, global_permit))) => {
                let in_flight = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
                self.counters.peak.fetch_max(in_flight, Ordering::AcqRel);
                self.counters.acquired.fetch_add(1, Ordering::Relaxed);
                Ok(SlotPermit {
                    _service: service_permit,
                    _global: global_permit,
                    counters: Arc::clone(&self.counters),
                })
            }
            Ok(Err(_)) => Err(Error::async_operation("Concurrency limiter closed")),
            Err(_) => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                debug!(
                    service_id = %service_id,
                    timeout_ms = self.acquire_timeout.as_millis(),
                    "Timed out waiting for a dispatch slot"
                );
                Err(Error::timeout(
                    TimeoutOperation::SlotAcquire,
                    self.acquire_timeout,
                ))
            }
        }
    }

    fn service_semaphore(&self, service_id: &str) -> Option<Arc<Semaphore>> {
        let limit = self.per_service_limit?;
        Some(Arc::clone(
            self.per_service
                .entry(service_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(limit)))
                .value(),
        ))
    }

    /// Forget the per-service semaphore of an unregistered service
    pub fn remove_service(&self, service_id: &str) {
        self.per_service.remove(service_id);
    }

    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of simultaneous calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            limit: self.limit,
            available: self.global.available_permits(),
            in_flight: self.in_flight(),
            peak_in_flight: self.peak_in_flight(),
            acquired: self.counters.acquired.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
        }
    }
}
