//! Response cache
//!
//! TTL-bounded, capacity-bounded cache for idempotent responses, with an
//! optional snapshot store for persistence across restarts.

pub mod maintenance;
pub mod persistence;
pub mod response_cache;

pub use maintenance::{spawn_expiry_sweeper, spawn_snapshotter};
pub use persistence::JsonFileSnapshotStore;
pub use response_cache::{CacheStats, ResponseCache};
