//! Bounded, time-limited LRU cache for search responses
//!
//! Expiry is checked when an entry is read, never by a sweep: an expired
//! entry stays in memory until a lookup or an eviction removes it, so memory
//! is bounded by `capacity` alone.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::clock::{SharedClock, SystemClock};
use crate::key::CacheKey;

/// Default maximum entry count.
pub const DEFAULT_CAPACITY: usize = 50;

/// Default time-to-live (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

pub struct SearchCache<V> {
    capacity: usize,
    ttl: Duration,
    map: HashMap<CacheKey, CacheEntry<V>>,
    /// Front is least recently used
    order: VecDeque<CacheKey>,
    clock: SharedClock,
}

impl<V: Clone> SearchCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            map: HashMap::new(),
            order: VecDeque::new(),
            clock,
        }
    }

    /// Look up a fresh entry, promoting it to most recently used.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let inserted_at = self.map.get(key)?.inserted_at;

        if now.duration_since(inserted_at) >= self.ttl {
            debug!("Cache entry expired: {}", key);
            self.remove(key);
            return None;
        }

        self.touch(key);
        self.map.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite an entry, stamped with the current time.
    ///
    /// A new key at capacity evicts the least recently used entry first.
    /// Overwriting an existing key never evicts.
    pub fn set(&mut self, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: self.clock.now(),
        };

        if self.map.contains_key(&key) {
            self.touch(&key);
            self.map.insert(key, entry);
            return;
        }

        if self.map.len() >= self.capacity {
            if let Some(old_key) = self.order.pop_front() {
                debug!("Cache full, evicting {}", old_key);
                self.map.remove(&old_key);
            }
        }

        self.order.push_back(key.clone());
        self.map.insert(key, entry);
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    /// Entries held, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn remove(&mut self, key: &CacheKey) {
        self.map.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }
}

impl<V: Clone> Default for SearchCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}
