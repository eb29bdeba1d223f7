use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached response value with its expiry and access bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` after `now`
    pub fn new(
        key: String,
        value: serde_json::Value,
        ttl: Duration,
        tags: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let delta = TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(36_500));
        Self {
            key,
            value,
            created_at: now,
            expires_at: now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC),
            access_count: 0,
            last_accessed: now,
            tags,
        }
    }

    /// An entry is stale strictly after its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at - now).to_std().ok()
    }

    /// Record a read
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
