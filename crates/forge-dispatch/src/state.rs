//! Shared provider runtime counters.
//!
//! The only genuinely concurrent mutable state in the system. Any worker
//! instance may mutate it, so the trait exposes nothing but atomic
//! primitives (increment, decrement floored at zero, set with expiry),
//! never raw read-modify-write. A Redis-backed implementation satisfies the
//! same contract for multi-instance deployments; the in-memory backend
//! serves tests and single instances.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Atomic key/value counter store with per-key expiry.
#[async_trait]
pub trait RuntimeStateStore: Send + Sync {
    /// Atomically increment `key` by one and return the new value.
    ///
    /// When the increment creates the key (or revives an expired one),
    /// `ttl_on_create` is applied as its expiry.
    async fn incr(&self, key: &str, ttl_on_create: Option<Duration>) -> i64;

    /// Atomically decrement `key` by one, floored at zero, and return the
    /// new value. Missing or expired keys stay at zero.
    async fn decr_floor(&self, key: &str) -> i64;

    /// Current value of `key`, if present and unexpired
    async fn get(&self, key: &str) -> Option<i64>;

    /// Set `key` to `value` with an optional expiry
    async fn set(&self, key: &str, value: i64, ttl: Option<Duration>);

    /// Reset the expiry of `key` without touching its value; no-op for a
    /// missing or expired key
    async fn expire(&self, key: &str, ttl: Duration);

    /// Remove `key`
    async fn remove(&self, key: &str);
}

#[derive(Debug)]
struct StateEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl StateEntry {
    fn new(value: i64, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory state store with lazy expiry.
///
/// Each key's mutations run under its map shard lock, giving the same
/// per-key atomicity the trait demands of distributed backends.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: DashMap<String, StateEntry>,
}

impl MemoryStateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuntimeStateStore for MemoryStateStore {
    async fn incr(&self, key: &str, ttl_on_create: Option<Duration>) -> i64 {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StateEntry::new(0, ttl_on_create));

        if entry.is_expired() {
            *entry = StateEntry::new(0, ttl_on_create);
        }
        entry.value += 1;
        entry.value
    }

    async fn decr_floor(&self, key: &str) -> i64 {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return 0;
        };
        if entry.is_expired() {
            entry.value = 0;
            return 0;
        }
        entry.value = (entry.value - 1).max(0);
        entry.value
    }

    async fn get(&self, key: &str) -> Option<i64> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value)
    }

    async fn set(&self, key: &str, value: i64, ttl: Option<Duration>) {
        self.entries
            .insert(key.to_string(), StateEntry::new(value, ttl));
    }

    async fn expire(&self, key: &str, ttl: Duration) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired() {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        }
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
