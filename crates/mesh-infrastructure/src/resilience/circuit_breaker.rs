//! Circuit breaker state machine
//!
//! ```text
//!   CLOSED --(failure_threshold consecutive failures)--> OPEN
//!   OPEN   --(recovery_timeout elapsed, next admission)--> HALF_OPEN
//!   HALF_OPEN --(success_threshold consecutive successes)--> CLOSED
//!   HALF_OPEN --(any failure)--> OPEN (recovery timer restarts)
//! ```
//!
//! Half-open admits one call at a time, and only admitted calls can
//! close the breaker. State and counters sit behind one
//! small mutex so concurrent reports for the same service are never lost.

use crate::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use mesh_domain::CircuitState;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// A state change, returned so the caller can publish it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerTransition {
    pub service_id: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Outcome of asking the breaker for permission to call
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Admission {
    pub permitted: bool,
    /// Set when the request moved the breaker from OPEN to HALF_OPEN
    pub transition: Option<BreakerTransition>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub service_id: String,
    pub state: CircuitState,
    /// Consecutive failures in CLOSED
    pub failure_count: u32,
    /// Consecutive successes in HALF_OPEN
    pub success_count: u32,
    pub last_transition_time: DateTime<Utc>,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub call_timeout_ms: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    transitioned_at: Instant,
    last_transition_time: DateTime<Utc>,
    probe_in_flight: bool,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
}

/// Circuit breaker guarding one service
#[derive(Debug)]
pub struct CircuitBreaker {
    service_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new<S: Into<String>>(service_id: S, config: CircuitBreakerConfig) -> Self {
        Self {
            service_id: service_id.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                transitioned_at: Instant::now(),
                last_transition_time: Utc::now(),
                probe_in_flight: false,
                total_successes: 0,
                total_failures: 0,
                total_rejections: 0,
            }),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    // A panic while holding the lock cannot leave the counters half-written
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call may proceed now
    pub fn can_execute(&self) -> bool {
        self.admit().permitted
    }

    /// Ask for permission to call, reporting an OPEN to HALF_OPEN transition
    ///
    /// A permitted half-open probe must be settled with
    /// [`record_success`](Self::record_success), [`record_failure`](Self::record_failure)
    /// or [`abandon`](Self::abandon); [`BreakerCall`] does this automatically.
    pub fn admit(&self) -> Admission {
        let mut inner = self.lock();
        let mut transition = None;

        if inner.state == CircuitState::Open
            && inner.transitioned_at.elapsed() >= self.config.recovery_timeout()
        {
            transition = self.transition(&mut inner, CircuitState::HalfOpen);
        }

        let permitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        };

        if !permitted {
            inner.total_rejections += 1;
        }

        Admission {
            permitted,
            transition,
        }
    }

    /// Report a successful call
    pub fn record_success(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        inner.total_successes += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed)
                } else {
                    None
                }
            }
            // Late result of a call admitted before the breaker opened
            CircuitState::Open => None,
        }
    }

    /// Report a failed call
    pub fn record_failure(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        inner.total_failures += 1;

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                debug!(
                    service_id = %self.service_id,
                    failures = inner.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker recorded failure"
                );
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Open => None,
        }
    }

    /// Report a health check of the service's endpoints
    ///
    /// A failed check counts like a failed call. A passing check clears the
    /// consecutive failure count in CLOSED and is ignored otherwise: it
    /// neither frees the half-open slot nor counts toward closing.
    pub fn record_health(&self, healthy: bool) -> Option<BreakerTransition> {
        if !healthy {
            return self.record_failure();
        }
        let mut inner = self.lock();
        if inner.state == CircuitState::Closed {
            inner.failure_count = 0;
        } else {
            debug!(
                service_id = %self.service_id,
                state = %inner.state,
                "Passing health check left to live calls"
            );
        }
        None
    }

    /// Release a half-open probe slot whose call never completed
    pub fn abandon(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    /// Force CLOSED with zero counters
    pub fn reset(&self) -> Option<BreakerTransition> {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.probe_in_flight = false;
        self.transition(&mut inner, CircuitState::Closed)
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            service_id: self.service_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_transition_time: inner.last_transition_time,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            recovery_timeout_ms: self.config.recovery_timeout_ms,
            call_timeout_ms: self.config.call_timeout_ms,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    fn transition(
        &self,
        inner: &mut BreakerState,
        to: CircuitState,
    ) -> Option<BreakerTransition> {
        let from = inner.state;
        if from == to {
            return None;
        }

        info!(
            service_id = %self.service_id,
            from = %from,
            to = %to,
            "Circuit breaker state transition"
        );

        inner.state = to;
        inner.transitioned_at = Instant::now();
        inner.last_transition_time = Utc::now();
        inner.probe_in_flight = false;
        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                inner.success_count = 0;
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                inner.success_count = 0;
            }
        }

        Some(BreakerTransition {
            service_id: self.service_id.clone(),
            from,
            to,
        })
    }
}

/// One admitted call, settled exactly once
///
/// Dropping it unsettled (timeout while waiting for a slot, cancelled
/// future) releases a half-open probe slot without counting a result.
#[derive(Debug)]
pub struct BreakerCall {
    breaker: Arc<CircuitBreaker>,
    settled: bool,
}

impl BreakerCall {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            settled: false,
        }
    }

    pub fn success(mut self) -> Option<BreakerTransition> {
        self.settled = true;
        self.breaker.record_success()
    }

    pub fn failure(mut self) -> Option<BreakerTransition> {
        self.settled = true;
        self.breaker.record_failure()
    }
}

impl Drop for BreakerCall {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon();
        }
    }
}
