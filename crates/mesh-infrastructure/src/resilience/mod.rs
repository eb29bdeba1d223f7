//! Resilience
//!
//! Per-service circuit breakers isolating failing dependencies.

pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{
    Admission, BreakerCall, BreakerTransition, CircuitBreaker, CircuitBreakerSnapshot,
};
pub use registry::CircuitBreakerRegistry;
