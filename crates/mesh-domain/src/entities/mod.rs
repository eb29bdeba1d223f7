//! Domain entities

mod service;

pub use service::{Endpoint, Protocol, ServiceDescriptor};
