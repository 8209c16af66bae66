//! Response cache with per-entry time-to-live.
//!
//! Expiry is lazy: an expired entry is evicted when it is next read, never by a
//! background sweep. The cache is owned by the widget store and is not consulted
//! by widget refreshes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::now_millis;

/// Five minutes.
pub const DEFAULT_TTL_MS: u64 = 300_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Value,
    /// Milliseconds since the Unix epoch.
    pub stored_at: u64,
    /// Milliseconds.
    pub ttl: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.stored_at) > self.ttl
    }
}

/// Key to payload mapping. Serializes as the bare mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
    #[serde(skip, default = "default_ttl")]
    default_ttl: u64,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_MS
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL_MS)
    }

    pub fn with_default_ttl(default_ttl: u64) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn set_default_ttl(&mut self, default_ttl: u64) {
        self.default_ttl = default_ttl;
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Payload for `key` if present and unexpired. Expired entries are evicted.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        self.get_at(key, now_millis())
    }

    pub fn get_at(&mut self, key: &str, now: u64) -> Option<&Value> {
        if self.entries.get(key)?.is_expired(now) {
            self.entries.remove(key);
            tracing::debug!("ResponseCache: evicted expired '{}'", key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.payload)
    }

    /// Store `payload` under `key`, overwriting any previous entry.
    pub fn set(&mut self, key: &str, payload: Value, ttl: Option<u64>) {
        self.set_at(key, payload, ttl, now_millis());
    }

    pub fn set_at(&mut self, key: &str, payload: Value, ttl: Option<u64>, now: u64) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at: now,
                ttl,
            },
        );
        tracing::debug!("ResponseCache: stored '{}' (ttl {} ms)", key, ttl);
    }

    /// Drop one entry. Returns true if it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache key for an endpoint URL, query string included.
pub fn cache_key_for(endpoint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    format!("api:{:x}", hasher.finalize())
}
