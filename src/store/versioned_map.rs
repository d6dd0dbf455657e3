use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// A lock-free, copy-on-write key-value store for small, rarely-changing
/// datasets: the coin-id dictionary, the tenant-symbol overrides, and each
/// FX source's day-rate table. Reads never block a concurrent replace;
/// `replace_all` builds a fresh map and swaps it in atomically, mirroring
/// the original's `pkg/in-memory.Store[K,V]` (an `atomic.Value` over a
/// plain map).
pub struct VersionedMap<K, V> {
    inner: ArcSwap<HashMap<K, V>>,
}

impl<K, V> VersionedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.load().get(key).cloned()
    }

    pub fn replace_all(&self, m: HashMap<K, V>) {
        self.inner.store(Arc::new(m));
    }

    /// Merges `patch` into the current snapshot and swaps in the result
    /// atomically: copy-then-write, never a lock held across the merge
    /// (mirrors the original's `Store.UpsertMany`).
    pub fn upsert_many(&self, patch: HashMap<K, V>) {
        let mut merged = (*self.inner.load_full()).clone();
        merged.extend(patch);
        self.inner.store(Arc::new(merged));
    }

    pub fn snapshot(&self) -> Arc<HashMap<K, V>> {
        self.inner.load_full()
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for VersionedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
