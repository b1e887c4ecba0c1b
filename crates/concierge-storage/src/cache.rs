//! Cache tier: string key/value with per-key time-to-live.
//!
//! Session state lives under `session:<id>` and profile state under
//! `profile:<id>`. An expired key reads exactly like an absent one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use concierge_core::clock::{Clock, SystemClock};
use concierge_core::error::ConciergeError;

/// Cache key for a live session.
pub fn session_key(session_id: impl std::fmt::Display) -> String {
    format!("session:{}", session_id)
}

/// Cache key for a customer profile.
pub fn profile_key(customer_id: &str) -> String {
    format!("profile:{}", customer_id)
}

/// Key/value store with expiring entries.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live value. Expired entries are reported as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, ConciergeError>;

    /// Write a value that expires after `ttl`, replacing any previous value
    /// and its expiry.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ConciergeError>;

    /// Remove a key. Returns whether a live value was removed.
    async fn del(&self, key: &str) -> Result<bool, ConciergeError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Writes between two sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 256;

/// In-process cache backed by a concurrent map.
///
/// Expiry is evaluated lazily against the injected clock on each read, and
/// every `sweep_interval`-th write sweeps out expired entries nobody reads
/// again.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
    writes: AtomicU64,
    sweep_interval: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            writes: AtomicU64::new(0),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sweep after every `writes` writes instead of the default.
    pub fn with_sweep_interval(mut self, writes: u64) -> Self {
        self.sweep_interval = writes.max(1);
        self
    }

    /// Number of stored entries, expired ones included until they are read
    /// or swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let purged = before - self.entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        purged
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ConciergeError> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ConciergeError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ConciergeError::Cache(format!("Invalid TTL: {}", e)))?;
        let expires_at = self.clock.now() + ttl;
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });

        let written = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if written % self.sweep_interval == 0 {
            self.purge_expired();
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, ConciergeError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry.expires_at > now)
            .unwrap_or(false))
    }
}
