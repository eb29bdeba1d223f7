//! Mesh events
//!
//! Events are published once on the event bus and fanned out to observers.

mod mesh_events;

pub use mesh_events::{MeshEvent, MeshEventKind};
