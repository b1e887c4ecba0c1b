//! Keyed mutual exclusion.
//!
//! One async lock per key, created on first use and dropped again once the
//! last holder or waiter lets go. The orchestrator gates sessions by id so
//! two messages for one session cannot interleave their window updates.
//! Context memory gates profiles by customer id so a cache fill cannot land
//! after a write has invalidated it.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug)]
pub struct KeyedGate<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedGate<K> {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: K) -> GateGuard<'_, K> {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        GateGuard {
            gate: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn release(&self, key: &K) {
        // Only the map's own reference left: no holder, no waiter.
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedGate<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to one key. Dropping it unlocks the key and removes the
/// entry when nobody else is queued on it.
pub struct GateGuard<'a, K: Eq + Hash + Clone> {
    gate: &'a KeyedGate<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for GateGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.gate.release(&self.key);
    }
}
