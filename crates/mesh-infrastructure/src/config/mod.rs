//! Configuration
//!
//! Typed configuration sections, layered loading with Figment and the
//! runtime update applied through the mesh facade.

pub mod loader;
pub mod types;

pub use loader::{ConfigBuilder, ConfigLoader};
pub use types::*;
