//! Embedding Cache: fixed-capacity, content-addressed LRU+TTL cache sitting in
//! front of the embedding provider.
//!
//! `Get` mutates (updates `accessed_at`/`access_count`, bumps `hits`/`misses`),
//! so every operation — reads included — takes the same exclusive lock. This
//! is the write-lock variant spec §9 calls authoritative; the read-lock-while-
//! mutating variant is a bug, not an alternative implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::document::now_secs;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    created_at: i64,
    accessed_at: i64,
    access_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatsSnapshot {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evicted_count: u64,
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evicted.store(0, Ordering::Relaxed);
    }
}

/// Thread-safe content-addressed embedding cache.
pub struct EmbeddingCache {
    capacity: usize,
    ttl_secs: i64,
    map: Mutex<HashMap<String, CacheEntry>>,
    counters: Counters,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl_secs: i64) -> Self {
        Self {
            capacity,
            ttl_secs,
            map: Mutex::new(HashMap::new()),
            counters: Counters::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// On hit (not expired): bumps stats, refreshes `accessed_at`, increments
    /// `access_count`, and returns a clone — never a reference into the map,
    /// so callers can never observe another holder's mutation.
    ///
    /// On TTL expiry: evicts in place and counts as a miss.
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut map = self.map.lock().expect("embedding cache lock poisoned");
        let now = now_secs();

        match map.get_mut(key) {
            Some(entry) if now - entry.created_at <= self.ttl_secs => {
                entry.accessed_at = now;
                entry.access_count += 1;
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.embedding.clone())
            }
            Some(_) => {
                map.remove(key);
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts (or replaces) `key`. Evicts the least-recently-accessed entry
    /// first if the cache is at capacity and `key` is not already present.
    pub fn set(&self, key: &str, embedding: Vec<f32>) {
        let mut map = self.map.lock().expect("embedding cache lock poisoned");
        let now = now_secs();

        if !map.contains_key(key) && map.len() >= self.capacity {
            if let Some(lru_key) = map
                .iter()
                .min_by_key(|(_, entry)| entry.accessed_at)
                .map(|(k, _)| k.clone())
            {
                map.remove(&lru_key);
                self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        map.insert(
            key.to_string(),
            CacheEntry {
                embedding,
                created_at: now,
                accessed_at: now,
                access_count: 1,
            },
        );
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let size = self.map.lock().expect("embedding cache lock poisoned").len();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheStatsSnapshot {
            size,
            hits,
            misses,
            hit_rate,
            evicted_count: self.counters.evicted.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.map.lock().expect("embedding cache lock poisoned").clear();
        self.counters.reset();
    }

    pub fn len(&self) -> usize {
        self.map.lock().expect("embedding cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_round_trip() {
        let cache = EmbeddingCache::with_defaults();
        assert_eq!(cache.get("a"), None);
        cache.set("a", vec![1.0, 2.0]);
        assert_eq!(cache.get("a"), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn scenario_cache_hit_accounting() {
        // spec §8 scenario 1: one miss then two hits.
        let cache = EmbeddingCache::with_defaults();
        assert_eq!(cache.get("foo"), None);
        cache.set("foo", vec![0.1, 0.2]);
        assert_eq!(cache.get("foo"), Some(vec![0.1, 0.2]));
        assert_eq!(cache.get("foo"), Some(vec![0.1, 0.2]));

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.evicted_count, 0);
    }

    #[test]
    fn capacity_evicts_lru() {
        let cache = EmbeddingCache::new(2, DEFAULT_TTL_SECS);
        cache.set("a", vec![1.0]);
        cache.set("b", vec![2.0]);
        // touch "a" so it's more recently used than "b"
        cache.get("a");
        cache.set("c", vec![3.0]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.stats().evicted_count >= 1);
    }

    #[test]
    fn ttl_expiry_counts_as_miss_and_evicts() {
        let cache = EmbeddingCache::new(10, -1); // already expired on insert
        cache.set("a", vec![1.0]);
        assert_eq!(cache.get("a"), None);
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.evicted_count, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn clear_resets_everything() {
        let cache = EmbeddingCache::with_defaults();
        cache.set("a", vec![1.0]);
        cache.get("a");
        cache.get("missing");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats, CacheStatsSnapshot { size: 0, hits: 0, misses: 0, hit_rate: 0.0, evicted_count: 0 });
    }

    #[test]
    fn returned_embedding_is_not_aliased() {
        let cache = EmbeddingCache::with_defaults();
        cache.set("a", vec![1.0, 2.0]);
        let mut got = cache.get("a").unwrap();
        got[0] = 99.0;
        assert_eq!(cache.get("a"), Some(vec![1.0, 2.0]));
    }
}
