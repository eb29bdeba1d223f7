//! In-memory response cache
//!
//! One mutex guards the entry map and an ordered eviction index. Every
//! operation is O(log n) apart from pattern, tag and expiry scans.
//! Capacity is enforced before insert, so the cache never holds more than
//! `max_entries` entries.

use crate::config::{CacheConfig, EvictionPolicy};
use chrono::{DateTime, Utc};
use globset::Glob;
use mesh_domain::CacheEntry;
use mesh_domain::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Position in the eviction order; the smallest rank is evicted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    primary: u64,
    tick: u64,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    rank: Rank,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Slot>,
    order: BTreeMap<Rank, String>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Cache counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

/// Capacity-bounded TTL cache with LRU or LFU eviction
pub struct ResponseCache {
    state: Mutex<CacheState>,
    policy: EvictionPolicy,
    max_entries: usize,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Create a cache from configuration
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_capacity(config.max_entries, config.policy, config.default_ttl())
    }

    pub fn with_capacity(
        max_entries: usize,
        policy: EvictionPolicy,
        default_ttl: Duration,
    ) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::cache_configuration("capacity must be at least 1"));
        }
        if default_ttl.is_zero() {
            return Err(Error::cache_configuration("default TTL cannot be 0"));
        }
        Ok(Self {
            state: Mutex::new(CacheState::default()),
            policy,
            max_entries,
            default_ttl,
        })
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value for `key` if present and unexpired
    ///
    /// A stale entry is removed on the way.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.lookup(key).ok()
    }

    /// Like [`get`](Self::get), telling a missing key apart from an expired one
    pub fn lookup(&self, key: &str) -> Result<serde_json::Value> {
        let now = Utc::now();
        let mut state = self.lock();

        let Some(slot) = state.entries.get(key) else {
            state.misses += 1;
            return Err(Error::cache_key_not_found(key));
        };

        if slot.entry.is_expired_at(now) {
            state.misses += 1;
            state.expirations += 1;
            remove_slot(&mut state, key);
            return Err(Error::cache_expired(key));
        }

        state.hits += 1;
        state.tick += 1;
        let tick = state.tick;
        let policy = self.policy;
        let CacheState { entries, order, .. } = &mut *state;
        let slot = entries
            .get_mut(key)
            .ok_or_else(|| Error::cache_key_not_found(key))?;
        slot.entry.touch(now);
        order.remove(&slot.rank);
        slot.rank = rank_for(policy, &slot.entry, tick);
        order.insert(slot.rank, key.to_string());
        Ok(slot.entry.value.clone())
    }

    /// Insert or overwrite `key`
    ///
    /// `ttl` defaults to the cache's default TTL. When a new key arrives at
    /// capacity one entry is evicted first; its key is returned.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: Vec<String>,
    ) -> Result<Option<String>> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(Error::cache_configuration("TTL cannot be 0"));
        }
        let entry = CacheEntry::new(key.into(), value, ttl, tags, Utc::now());
        Ok(self.insert_entry(entry))
    }

    fn insert_entry(&self, entry: CacheEntry) -> Option<String> {
        let mut state = self.lock();
        let key = entry.key.clone();

        let evicted = if state.entries.contains_key(&key) {
            remove_slot(&mut state, &key);
            None
        } else if state.entries.len() >= self.max_entries {
            let victim = state.order.first_key_value().map(|(_, k)| k.clone());
            if let Some(victim) = &victim {
                remove_slot(&mut state, victim);
                state.evictions += 1;
                debug!(key = %victim, policy = ?self.policy, "Evicted cache entry");
            }
            victim
        } else {
            None
        };

        state.tick += 1;
        let rank = rank_for(self.policy, &entry, state.tick);
        state.order.insert(rank, key.clone());
        state.entries.insert(key, Slot { entry, rank });
        evicted
    }

    /// Remove `key`; true if it was present
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.lock();
        remove_slot(&mut state, key)
    }

    /// Remove everything; returns the number of entries dropped
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.order.clear();
        count
    }

    /// Unexpired keys matching a glob pattern (`*` matches everything), sorted
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|e| Error::cache_configuration(format!("invalid key pattern: {e}")))?
            .compile_matcher();
        let now = Utc::now();
        let state = self.lock();
        let mut keys: Vec<String> = state
            .entries
            .values()
            .filter(|slot| !slot.entry.is_expired_at(now) && matcher.is_match(&slot.entry.key))
            .map(|slot| slot.entry.key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Remove every entry carrying `tag`; returns the number removed
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<String> = state
            .entries
            .values()
            .filter(|slot| slot.entry.has_tag(tag))
            .map(|slot| slot.entry.key.clone())
            .collect();
        for key in &doomed {
            remove_slot(&mut state, key);
        }
        doomed.len()
    }

    /// Drop every expired entry; returns the number removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|slot| slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.key.clone())
            .collect();
        for key in &expired {
            remove_slot(&mut state, key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Copies of all unexpired entries, for snapshots
    pub fn export(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        let state = self.lock();
        let mut entries: Vec<CacheEntry> = state
            .entries
            .values()
            .filter(|slot| !slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Load entries from a snapshot, skipping expired ones; returns the number loaded
    pub fn restore(&self, mut entries: Vec<CacheEntry>) -> usize {
        let now = Utc::now();
        entries.retain(|entry| !entry.is_expired_at(now));
        // Oldest access first, so the most recently used survive a smaller capacity
        entries.sort_by_key(|entry| entry.last_accessed);
        let loaded = entries.len();
        for entry in entries {
            self.insert_entry(entry);
        }
        loaded.min(self.max_entries)
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Utc::now();
        self.lock()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired_at(now))
    }

    /// Entries currently held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}

fn rank_for(policy: EvictionPolicy, entry: &CacheEntry, tick: u64) -> Rank {
    match policy {
        EvictionPolicy::Lru => Rank {
            primary: tick,
            tick,
        },
        EvictionPolicy::Lfu => Rank {
            primary: entry.access_count,
            tick,
        },
    }
}

fn remove_slot(state: &mut CacheState, key: &str) -> bool {
    match state.entries.remove(key) {
        Some(slot) => {
            state.order.remove(&slot.rank);
            true
        }
        None => false,
    }
}
