//! Key index over block-owned entries
//!
//! The index never owns an entry: it holds a [`Weak`] reference and resolves
//! staleness on access, either through the entry's own expiry or because the
//! owning block has already been reclaimed.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::clock::Timestamp;
use crate::entry::Entry;

/// Concurrent key → entry lookup table.
#[derive(Debug)]
pub struct KeyIndex<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, Weak<Entry<V>>>,
}

impl<K, V> Default for KeyIndex<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            map: DashMap::new(),
        }
    }
}

impl<K, V> KeyIndex<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `key` at `entry`, replacing any previous mapping.
    pub fn insert(&self, key: K, entry: &Arc<Entry<V>>) {
        self.map.insert(key, Arc::downgrade(entry));
    }

    /// The entry behind `key`, if its block is still alive.
    ///
    /// The caller still has to check the entry's expiry.
    pub fn lookup(&self, key: &K) -> Option<Arc<Entry<V>>> {
        self.map.get(key).and_then(|weak| weak.upgrade())
    }

    /// Drops the mapping for `key` and returns the entry if still reachable.
    pub fn remove(&self, key: &K) -> Option<Arc<Entry<V>>> {
        self.map.remove(key).and_then(|(_, weak)| weak.upgrade())
    }

    /// Drops mappings that can no longer yield a value at `now`.
    ///
    /// Returns the number of mappings removed.
    pub fn retain_live(&self, now: Timestamp) -> usize {
        let before = self.map.len();
        self.map.retain(|_, weak| {
            weak.upgrade()
                .is_some_and(|entry| entry.is_live_at(now))
        });
        before.saturating_sub(self.map.len())
    }

    /// Number of mappings, stale ones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}
