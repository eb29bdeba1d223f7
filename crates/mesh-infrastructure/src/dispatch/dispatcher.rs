//! Request dispatcher
//!
//! `send_request` steps, in order:
//!
//! 1. validate method, path and headers (no network effect on failure)
//! 2. resolve an endpoint through the registry
//! 3. serve cacheable requests from the response cache
//! 4. ask the service's circuit breaker for admission
//! 5. wait for a concurrency slot
//! 6. call the transport under the call timeout
//! 7. settle the breaker, fill the cache and publish the outcome
//!
//! Step 7 only touches shared state if the registration resolved in step 2
//! is still current. A call that outlives an unregister (or a re-register of
//! the same id) must not repopulate the cache or the metrics of the old
//! registration.

use super::limiter::ConcurrencyLimiter;
use crate::cache::ResponseCache;
use crate::events::EventBus;
use crate::resilience::{BreakerCall, BreakerTransition, CircuitBreakerRegistry};
use crate::routing::{EndpointLease, ServiceRegistry};
use crate::utils::TimedOperation;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use mesh_domain::error::{Error, Result};
use mesh_domain::ports::{OutboundRequest, ServiceTransport};
use mesh_domain::{
    HttpMethod, MeshEvent, MeshEventKind, ServiceDescriptor, ServiceRequest, ServiceResponse,
    TimeoutOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Shape of a response stored in the response cache
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status_code: u16,
    body: serde_json::Value,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Routes requests to registered services
pub struct RequestDispatcher {
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: Arc<ResponseCache>,
    limiter: Arc<ConcurrencyLimiter>,
    transport: Arc<dyn ServiceTransport>,
    bus: Arc<EventBus>,
    call_timeout: Duration,
    breaker_enabled: AtomicBool,
    caching_enabled: AtomicBool,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        cache: Arc<ResponseCache>,
        limiter: Arc<ConcurrencyLimiter>,
        transport: Arc<dyn ServiceTransport>,
        bus: Arc<EventBus>,
    ) -> Self {
        let call_timeout = breakers.config().call_timeout();
        Self {
            registry,
            breakers,
            cache,
            limiter,
            transport,
            bus,
            call_timeout,
            breaker_enabled: AtomicBool::new(true),
            caching_enabled: AtomicBool::new(true),
        }
    }

    pub fn set_breaker_enabled(&self, enabled: bool) {
        self.breaker_enabled.store(enabled, Ordering::Release);
    }

    pub fn set_caching_enabled(&self, enabled: bool) {
        self.caching_enabled.store(enabled, Ordering::Release);
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Dispatch one request
    pub async fn send_request(&self, request: ServiceRequest) -> Result<ServiceResponse> {
        let timer = TimedOperation::start();
        let resolved = request.validate().and_then(|method| {
            let lease = self.registry.resolve(&request.service_id)?;
            Ok((method, lease))
        });
        let (generation, outcome) = match resolved {
            Ok((method, lease)) => {
                let generation = lease.generation();
                (Some(generation), self.dispatch(&request, method, lease, timer).await)
            }
            Err(e) => (None, Err(e)),
        };

        let event = match &outcome {
            Ok(response) => Some(MeshEventKind::RequestCompleted {
                method: request.method.to_ascii_uppercase(),
                path: request.path.clone(),
                status_code: response.status_code,
                response_time_ms: response.response_time.as_secs_f64() * 1000.0,
                cached: response.cached,
            }),
            // Unknown ids would leave metric series nobody cleans up
            Err(Error::ServiceNotFound { .. }) => {
                debug!(service_id = %request.service_id, "Request for unknown service");
                None
            }
            Err(e) => Some(MeshEventKind::RequestFailed {
                method: request.method.to_ascii_uppercase(),
                path: request.path.clone(),
                error: e.to_string(),
                rejected: is_rejection(e),
            }),
        };
        if let Some(kind) = event {
            let service_id = request.service_id.as_str();
            let publish = |_: &ServiceDescriptor| {
                self.bus.publish(MeshEvent::for_service(service_id, kind));
            };
            // Failures before resolution are reported against any live registration
            let published = match generation {
                Some(generation) => self
                    .registry
                    .with_registration(service_id, generation, publish),
                None => self.registry.with_service(service_id, publish),
            };
            if published.is_none() {
                debug!(service_id = %service_id, "Outcome of a removed registration not published");
            }
        }
        outcome
    }

    /// Dispatch many requests concurrently
    ///
    /// The stream is lazy: nothing is sent until it is polled. Items arrive
    /// in completion order, tagged with the request's position in
    /// `requests`. All calls share the dispatcher's limiter.
    pub fn send_batch(
        &self,
        requests: Vec<ServiceRequest>,
    ) -> BoxStream<'_, (usize, Result<ServiceResponse>)> {
        requests
            .into_iter()
            .enumerate()
            .map(move |(index, request)| async move { (index, self.send_request(request).await) })
            .collect::<FuturesUnordered<_>>()
            .boxed()
    }

    async fn dispatch(
        &self,
        request: &ServiceRequest,
        method: HttpMethod,
        lease: EndpointLease,
        timer: TimedOperation,
    ) -> Result<ServiceResponse> {
        let service_id = request.service_id.as_str();
        let generation = lease.generation();

        let cache_key = request.cache_key();
        let use_cache = method.is_cacheable() && self.caching_enabled.load(Ordering::Acquire);
        if use_cache {
            if let Some(hit) = self.cached(&cache_key) {
                debug!(service_id = %service_id, key = %cache_key, "Served from cache");
                let mut response = ServiceResponse::new(hit.status_code, hit.body);
                response.headers = hit.headers;
                response.cached = true;
                response.response_time = timer.elapsed();
                return Ok(response);
            }
        }

        let call = if self.breaker_enabled.load(Ordering::Acquire) {
            let breaker = self.breakers.get_or_create(service_id);
            let admission = breaker.admit();
            if let Some(transition) = admission.transition {
                self.publish_transition(generation, transition);
            }
            if !admission.permitted {
                return Err(Error::circuit_open(service_id));
            }
            Some(BreakerCall::new(breaker))
        } else {
            None
        };

        let _permit = self.limiter.acquire(service_id).await?;

        let call_timeout = request.timeout.unwrap_or(self.call_timeout);
        let outbound = OutboundRequest {
            method,
            path: request.path.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: call_timeout,
        };
        let endpoint = lease.endpoint();
        let result = tokio::time::timeout(call_timeout, self.transport.execute(endpoint, outbound))
            .await
            .unwrap_or_else(|_| Err(Error::timeout(TimeoutOperation::Call, call_timeout)));

        match result {
            Ok(reply) if reply.status_code >= 500 => {
                self.settle(generation, call, false);
                warn!(
                    service_id = %service_id,
                    endpoint = %endpoint.address(),
                    status_code = reply.status_code,
                    "Backend returned a server error"
                );
                Err(Error::unavailable_with_status(service_id, reply.status_code))
            }
            Ok(reply) => {
                self.settle(generation, call, true);
                let mut response = ServiceResponse::new(reply.status_code, reply.body);
                response.headers = reply.headers;
                response.endpoint = Some(endpoint.address());
                response.response_time = timer.elapsed();
                if use_cache && response.is_success() {
                    self.fill_cache(service_id, generation, cache_key, &response);
                }
                Ok(response)
            }
            Err(e) => {
                self.settle(generation, call, false);
                warn!(
                    service_id = %service_id,
                    endpoint = %endpoint.address(),
                    error = %e,
                    "Outbound call failed"
                );
                Err(e)
            }
        }
    }

    fn cached(&self, key: &str) -> Option<CachedResponse> {
        let value = self.cache.get(key)?;
        serde_json::from_value(value).ok()
    }

    fn fill_cache(
        &self,
        service_id: &str,
        generation: u64,
        key: String,
        response: &ServiceResponse,
    ) {
        let cached = CachedResponse {
            status_code: response.status_code,
            body: response.body.clone(),
            headers: response.headers.clone(),
        };
        let value = match serde_json::to_value(cached) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Response not cacheable");
                return;
            }
        };
        let stored = self.registry.with_registration(service_id, generation, |_| {
            self.cache.set(key, value, None, vec![service_id.to_string()])
        });
        match stored {
            None => debug!(service_id = %service_id, "Registration replaced; response not cached"),
            Some(Ok(Some(evicted))) => {
                self.bus
                    .publish(MeshEvent::mesh(MeshEventKind::CacheEvicted { key: evicted }));
            }
            Some(Ok(None)) => {}
            Some(Err(e)) => warn!(service_id = %service_id, error = %e, "Cache fill failed"),
        }
    }

    fn settle(&self, generation: u64, call: Option<BreakerCall>, success: bool) {
        let Some(call) = call else {
            return;
        };
        let transition = if success {
            call.success()
        } else {
            call.failure()
        };
        if let Some(transition) = transition {
            self.publish_transition(generation, transition);
        }
    }

    fn publish_transition(&self, generation: u64, transition: BreakerTransition) {
        let service_id = transition.service_id.clone();
        let event = MeshEvent::for_service(
            transition.service_id,
            MeshEventKind::BreakerStateChanged {
                from: transition.from,
                to: transition.to,
            },
        );
        self.registry
            .with_registration(&service_id, generation, |_| self.bus.publish(event));
    }
}

/// Failures decided by the mesh itself, before any backend was reached
fn is_rejection(error: &Error) -> bool {
    error.is_validation()
        || error.is_circuit_open()
        || error.is_busy()
        || matches!(error, Error::LoadBalancing { .. })
}
