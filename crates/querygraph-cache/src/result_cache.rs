// ABOUTME: Bounded key->result store for completed queries
// ABOUTME: Evicts the oldest-inserted entry when full; reads do not affect eviction order

use crate::{CacheEntry, CacheStats};
use querygraph_core::{ProcessOptions, Result};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// FIFO-bounded cache. Not synchronized; owners wrap it in a lock.
#[derive(Debug)]
pub struct ResultCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    capacity: usize,
    stats: CacheStats,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    /// Cache key: lowercased query text followed by the serialized options
    pub fn key(query: &str, options: &ProcessOptions) -> Result<String> {
        Ok(format!(
            "{}{}",
            query.trim().to_lowercase(),
            serde_json::to_string(options)?
        ))
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace. A replaced key keeps its original queue position.
    /// Returns the evicted key, if any.
    pub fn insert(&mut self, key: String, value: V) -> Option<String> {
        self.stats.insertions += 1;

        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = CacheEntry::new(value);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order.pop_front().inspect(|oldest| {
                self.entries.remove(oldest);
                self.stats.evictions += 1;
                debug!(key = %oldest, "Evicted oldest cache entry");
            })
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, CacheEntry::new(value));
        self.stats.entries = self.entries.len();
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.stats.entries = 0;
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

    /// Keys from oldest to newest insertion
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }
}
