use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use super::{CachedHandler, EvictionPolicy, LruEvictionPolicy};
use crate::runtime::Handler;
use crate::runtime::metrics::OptimizerMetrics;

/// Capacity-bounded map from operation key to a directly invocable handler.
pub struct FastPathCache {
    entries: AHashMap<String, CachedHandler>,
    eviction_policy: LruEvictionPolicy,
    capacity: usize,
    metrics: Arc<OptimizerMetrics>,
}

impl FastPathCache {
    pub fn new(capacity: usize, metrics: Arc<OptimizerMetrics>) -> Self {
        Self {
            entries: AHashMap::with_capacity(capacity),
            eviction_policy: LruEvictionPolicy::new(),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Look up a handler, refreshing its LRU position on a hit.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<CachedHandler> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.metadata.record_access(now_ms);
                self.eviction_policy.on_access(key);
                self.metrics.record_hit();
                Some(entry.clone())
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Store a handler, evicting the least recently used entry when full.
    ///
    /// Replacing an existing key never evicts. Returns the evicted key.
    pub fn insert(
        &mut self,
        key: &str,
        handler: Handler,
        source_module: Option<String>,
        now_ms: u64,
    ) -> Option<String> {
        let mut evicted = None;
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            evicted = self.evict_one();
        }

        let entry = CachedHandler::new(handler, source_module, now_ms);
        if self.entries.insert(key.to_string(), entry).is_some() {
            self.eviction_policy.on_access(key);
        } else {
            self.eviction_policy.on_add(key);
        }
        evicted
    }

    fn evict_one(&mut self) -> Option<String> {
        let victim = self.eviction_policy.evict(&self.entries)?;
        self.entries.remove(&victim);
        self.eviction_policy.on_remove(&victim);
        self.metrics.record_eviction();
        debug!(key = victim.as_str(), "fast path evicted");
        Some(victim)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.eviction_policy.on_remove(key);
            true
        } else {
            false
        }
    }

    /// Drop every entry bound from `module`. Returns the removed keys.
    pub fn remove_sourced_from(&mut self, module: &str) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_sourced_from(module))
            .map(|(key, _)| key.clone())
            .collect();
        removed.sort();
        for key in &removed {
            self.remove(key);
        }
        self.metrics.record_invalidations(removed.len());
        removed
    }

    /// Change capacity, evicting down to the new bound. Returns evicted keys.
    pub fn set_capacity(&mut self, capacity: usize) -> Vec<String> {
        self.capacity = capacity.max(1);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_one() {
                Some(key) => evicted.push(key),
                None => break,
            }
        }
        evicted
    }

    /// Distinct modules that cached handlers were bound from.
    pub fn source_modules(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .filter_map(|entry| entry.source_module.clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys from least to most recently used.
    pub fn lru_order(&self) -> Vec<String> {
        self.eviction_policy
            .iter_lru()
            .filter(|key| self.entries.contains_key(*key))
            .map(str::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empty the cache. Heat and module state are untouched.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.eviction_policy.clear();
    }
}
