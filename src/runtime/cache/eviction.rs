use std::collections::BTreeMap;

use ahash::AHashMap;

use super::CachedHandler;

/// Eviction policy for the fast-path cache
pub trait EvictionPolicy: Send + Sync {
    /// Decide which entry to evict
    fn evict(&mut self, cache: &AHashMap<String, CachedHandler>) -> Option<String>;

    /// Called when an entry is read
    fn on_access(&mut self, key: &str);

    /// Called when an entry is added
    fn on_add(&mut self, key: &str);

    /// Called when an entry is removed
    fn on_remove(&mut self, key: &str);

    /// Forget every tracked key
    fn clear(&mut self);
}

/// LRU (Least Recently Used) eviction policy.
///
/// Every add or access stamps the key with a fresh tick from a monotonic
/// counter, so the oldest stamp is always the least recently touched entry
/// and entries never touched since insertion leave in insertion order.
#[derive(Debug, Default)]
pub struct LruEvictionPolicy {
    order: BTreeMap<u64, String>,
    ticks: AHashMap<String, u64>,
    next_tick: u64,
}

impl LruEvictionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&mut self, key: &str) {
        if let Some(old) = self.ticks.remove(key) {
            self.order.remove(&old);
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key.to_string());
        self.ticks.insert(key.to_string(), tick);
    }

    /// Keys from least to most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }
}

impl EvictionPolicy for LruEvictionPolicy {
    fn evict(&mut self, cache: &AHashMap<String, CachedHandler>) -> Option<String> {
        self.order
            .values()
            .find(|key| cache.contains_key(key.as_str()))
            .cloned()
    }

    fn on_access(&mut self, key: &str) {
        // Move to the most recently used end
        self.stamp(key);
    }

    fn on_add(&mut self, key: &str) {
        self.stamp(key);
    }

    fn on_remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ticks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_moves_key_to_most_recent() {
        let mut policy = LruEvictionPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_add("c");
        policy.on_access("a");

        let order: Vec<&str> = policy.iter_lru().collect();
        assert_eq!(order, ["b", "c", "a"]);
    }

    #[test]
    fn removed_keys_are_forgotten() {
        let mut policy = LruEvictionPolicy::new();
        policy.on_add("a");
        policy.on_add("b");
        policy.on_remove("a");

        let order: Vec<&str> = policy.iter_lru().collect();
        assert_eq!(order, ["b"]);
    }
}
