//! Keyed lock manager
//!
//! [`KeyedLocks`] maps each key to exactly one `Arc<Mutex<V>>` for the lifetime
//! of the map. Holding the guard for a key is holding the exclusive lock on
//! the value behind it; distinct keys never contend.
//!
//! # Design
//!
//! The slot table is a `DashMap`, so finding or creating a slot only takes a
//! short shard lock. The shard lock is released before the per-key mutex is
//! awaited, which keeps a slow lock holder from stalling unrelated keys that
//! hash to the same shard.
//!
//! Used for account rows (`V = Account`), rate cache entries
//! (`V = Option<CachedRate>`) and payments (`V = Payment`).

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive lock handle for one key
pub type KeyGuard<V> = OwnedMutexGuard<V>;

#[derive(Debug)]
pub struct KeyedLocks<K, V>
where
    K: Eq + Hash,
{
    slots: DashMap<K, Arc<Mutex<V>>>,
}

impl<K, V> KeyedLocks<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Register `value` under `key` unless the key already has a slot
    ///
    /// # Returns
    ///
    /// `true` if the value was inserted, `false` if the key was taken.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut inserted = false;
        self.slots.entry(key).or_insert_with(|| {
            inserted = true;
            Arc::new(Mutex::new(value))
        });
        inserted
    }

    /// The lock instance for `key`, if the key is known
    pub fn handle(&self, key: &K) -> Option<Arc<Mutex<V>>> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// The lock instance for `key`, creating it with `init` on first use
    pub fn handle_or_insert_with<F>(&self, key: K, init: F) -> Arc<Mutex<V>>
    where
        F: FnOnce() -> V,
    {
        Arc::clone(
            self.slots
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(init())))
                .value(),
        )
    }

    /// Wait for the exclusive lock on `key`
    ///
    /// Returns `None` if the key has no slot.
    pub async fn lock(&self, key: &K) -> Option<KeyGuard<V>> {
        let handle = self.handle(key)?;
        Some(handle.lock_owned().await)
    }

    /// Wait for the exclusive lock on `key`, creating the slot with `init` if needed
    pub async fn lock_or_insert_with<F>(&self, key: K, init: F) -> KeyGuard<V>
    where
        F: FnOnce() -> V,
    {
        self.handle_or_insert_with(key, init).lock_owned().await
    }

    /// Drop the slot for `key`
    ///
    /// Guards already handed out stay valid; later lookups no longer see the key.
    pub fn remove(&self, key: &K) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<K> {
        self.slots.iter().map(|slot| slot.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K, V> Default for KeyedLocks<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
