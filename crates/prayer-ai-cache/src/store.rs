//! In-memory result store with per-entry expiry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::fingerprint::Fingerprint;

/// A stored producer result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized result
    pub value: Value,
    /// When the entry was stored
    pub created_at: Instant,
    /// First instant at which the entry is logically absent
    pub expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Map of fingerprints to live results
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a copy of the live value, evicting it if it has expired
    pub fn get(&self, key: &Fingerprint) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries();

        let entry = entries.get(key)?;
        if !entry.is_expired(now) {
            return Some(entry.value.clone());
        }

        entries.remove(key);
        debug!("Evicted expired entry {} on read", key);
        None
    }

    /// Whether a live entry exists, without evicting anything
    pub fn contains(&self, key: &Fingerprint) -> bool {
        let now = Instant::now();
        self.entries()
            .get(key)
            .map_or(false, |entry| !entry.is_expired(now))
    }

    /// Stores or replaces the entry for `key`
    pub fn insert(&self, key: Fingerprint, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(value, ttl, Instant::now());
        self.entries().insert(key, entry);
    }

    pub fn remove(&self, key: &Fingerprint) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Drops every entry of one operation, returning how many were removed
    pub fn remove_operation(&self, operation: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| key.operation() != operation);
        before - entries.len()
    }

    /// Drops all expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
