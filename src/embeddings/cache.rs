// cache.rs — Bounded in-memory embedding cache with FIFO eviction.
//
// Keyed by cleaned text. Insertion order is the only eviction signal: reads
// never move an entry, so a hot key is evicted exactly when it would have been
// had nobody read it. Values go in and come out as deep copies.

use std::collections::{HashMap, VecDeque};

use anyhow::ensure;

use crate::config;
use crate::embeddings::vector::EmbeddingVector;

#[derive(Debug)]
pub struct EmbeddingCache {
    entries: HashMap<String, EmbeddingVector>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_capacity(config::cache::EMBEDDING_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// A private copy of the cached embedding, if present.
    pub fn get(&self, key: &str) -> Option<EmbeddingVector> {
        let cached = self.entries.get(key)?;
        match cached.deep_copy() {
            Ok(copy) => Some(copy),
            Err(e) => {
                log::warn!("Failed to copy cached embedding, treating as miss: {:?}", e);
                None
            }
        }
    }

    /// Store a copy of `value` under `key`.
    ///
    /// An existing key keeps its position and takes the new value. A new key at
    /// capacity evicts the earliest-inserted entry first.
    pub fn set(&mut self, key: &str, value: &EmbeddingVector) -> anyhow::Result<()> {
        ensure!(!value.is_empty(), "refusing to cache an empty embedding for {key:?}");
        let copy = value.deep_copy()?;

        if let Some(slot) = self.entries.get_mut(key) {
            let previous = std::mem::replace(slot, copy);
            previous.release();
            return Ok(());
        }

        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.order.push_back(key.to_string());
        self.entries.insert(key.to_string(), copy);
        Ok(())
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            if let Some(evicted) = self.entries.remove(&oldest) {
                evicted.release();
            }
            log::debug!("Evicted oldest cached embedding ({} chars)", oldest.len());
        }
    }

    /// Release every entry. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        for (_, value) in self.entries.drain() {
            value.release();
        }
        self.order.clear();
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
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
}
