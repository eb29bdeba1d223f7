//! Request dispatch
//!
//! The dispatcher runs each call through validation, routing, the response
//! cache, the circuit breaker and the concurrency limiter before handing it
//! to the transport.

pub mod dispatcher;
pub mod limiter;

pub use dispatcher::RequestDispatcher;
pub use limiter::{ConcurrencyLimiter, LimiterStats, SlotPermit};
