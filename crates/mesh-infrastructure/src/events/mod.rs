//! Event bus
//!
//! Synchronous observer fan-out for mesh events.

mod bus;

pub use bus::{EventBus, ObserverInfo};
