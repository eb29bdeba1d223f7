//! Cache Snapshot Port
//!
//! Durable storage for response cache snapshots. The format is an
//! implementation detail of each store.

use crate::error::Result;
use crate::value_objects::CacheEntry;
use async_trait::async_trait;

/// Saves and restores the response cache contents
#[async_trait]
pub trait CacheSnapshotStore: Send + Sync {
    /// Replace the stored snapshot with `entries`
    async fn save(&self, entries: &[CacheEntry]) -> Result<()>;

    /// Load the last snapshot; an absent snapshot yields an empty list
    async fn load(&self) -> Result<Vec<CacheEntry>>;
}
