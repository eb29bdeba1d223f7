//! Response cache configuration types

use crate::constants::{
    CACHE_DEFAULT_MAX_ENTRIES, CACHE_DEFAULT_TTL_SECS, CACHE_SNAPSHOT_INTERVAL_SECS,
    CACHE_SWEEP_INTERVAL_SECS,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Victim selection when the cache is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed entry goes first
    #[default]
    Lru,
    /// Least frequently accessed entry goes first, oldest access breaking ties
    Lfu,
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Eviction policy
    pub policy: EvictionPolicy,
    /// Maximum number of entries
    pub max_entries: usize,
    /// TTL applied to cached responses
    pub default_ttl_secs: u64,
    /// Interval between expired-entry sweeps
    pub sweep_interval_secs: u64,
    /// Snapshot file; persistence is off when unset
    pub snapshot_path: Option<PathBuf>,
    /// Interval between snapshots
    pub snapshot_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::Lru,
            max_entries: CACHE_DEFAULT_MAX_ENTRIES,
            default_ttl_secs: CACHE_DEFAULT_TTL_SECS,
            sweep_interval_secs: CACHE_SWEEP_INTERVAL_SECS,
            snapshot_path: None,
            snapshot_interval_secs: CACHE_SNAPSHOT_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}
