//! Tier 1: bounded in-memory LRU store
//!
//! Two independent limits apply: an entry count and an aggregate byte
//! estimate. Inserting evicts from the least recently used end until both
//! limits hold. All operations are synchronous; the internal mutex is never
//! held across an await point.

use crate::cache::{
    config::MemoryTierConfig,
    entry::CacheEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    lru::LruMap,
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::{CacheError, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hot tier with count and byte bounds
pub struct MemoryTier<T> {
    config: MemoryTierConfig,
    state: Mutex<HotState<T>>,
}

struct HotState<T> {
    entries: LruMap<CacheEntry<T>>,
    size_bytes: u64,
    stats: CacheStats,
}

impl<T> HotState<T> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.metadata.size_bytes);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (key, entry) = self.entries.pop_lru()?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.metadata.size_bytes);
        self.stats.evictions_size += 1;
        Some(key)
    }

    fn remove_expired(&mut self, key: &str) {
        if self.remove(key).is_some() {
            self.stats.evictions_ttl += 1;
            debug!("Hot tier entry expired: {}", key);
        }
    }
}

impl<T: CacheValue> MemoryTier<T> {
    /// Create an empty tier
    pub fn new(config: MemoryTierConfig) -> Self {
        info!(
            "Initializing hot tier (max_entries: {}, max_size_bytes: {})",
            config.max_entries, config.max_size_bytes
        );

        Self {
            config,
            state: Mutex::new(HotState {
                entries: LruMap::new(),
                size_bytes: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &MemoryTierConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, HotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a value, promoting it to most recently used
    pub fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Get the full entry, promoting it to most recently used
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let mut state = self.state();

        let expired = match state.entries.peek(key) {
            Some(entry) => entry.is_expired(),
            None => {
                state.stats.misses += 1;
                debug!("Hot tier miss: {}", key);
                return None;
            }
        };

        if expired {
            state.remove_expired(key);
            state.stats.misses += 1;
            return None;
        }

        state.entries.promote(key);
        let entry = state.entries.peek_mut(key)?;
        entry.mark_accessed();
        let entry = entry.clone();
        state.stats.hits += 1;

        debug!("Hot tier hit: {}", key);
        Some(entry)
    }

    /// Store a value; `None` uses the configured default TTL
    pub fn set(&self, key: impl Into<CacheKey>, value: T, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.insert_entry(CacheEntry::new(key, value, ttl))
    }

    /// Store a prebuilt entry, keeping its timestamps and TTL
    pub fn insert_entry(&self, mut entry: CacheEntry<T>) -> Result<()> {
        let size = entry.estimate_size()?;

        let mut state = self.state();
        // a rejected write must not leave the previous value readable
        let replaced = state.remove(&entry.key).is_some();

        if size > self.config.max_size_bytes {
            if replaced {
                state.stats.invalidations += 1;
            }
            warn!(
                "Entry {} ({} bytes) exceeds hot tier budget of {} bytes",
                entry.key, size, self.config.max_size_bytes
            );
            return Err(CacheError::EntryTooLarge {
                size_bytes: size,
                max_bytes: self.config.max_size_bytes,
            });
        }
        entry.metadata.size_bytes = size;

        while state.entries.len() >= self.config.max_entries
            || state.size_bytes + size > self.config.max_size_bytes
        {
            match state.evict_lru() {
                Some(evicted) => debug!("Evicted hot tier entry: {}", evicted),
                None => break,
            }
        }

        let key = entry.key.clone();
        state.entries.insert(key, entry);
        state.size_bytes += size;
        state.stats.sets += 1;

        Ok(())
    }

    /// Existence check; refreshes recency but not the access counter
    pub fn has(&self, key: &str) -> bool {
        let mut state = self.state();

        let expired = match state.entries.peek(key) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };

        if expired {
            state.remove_expired(key);
            return false;
        }

        state.entries.promote(key);
        if let Some(entry) = state.entries.peek_mut(key) {
            entry.touch();
        }
        true
    }

    /// Remove a key; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state();
        let removed = state.remove(key).is_some();
        if removed {
            state.stats.invalidations += 1;
            debug!("Removed hot tier entry: {}", key);
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.state();
        let count = state.entries.len();
        state.entries.clear();
        state.size_bytes = 0;
        state.stats.invalidations += count as u64;
        info!("Cleared {} entries from hot tier", count);
    }

    /// Read without touching recency, counters or expiry state
    pub fn peek(&self, key: &str) -> Option<T> {
        self.peek_entry(key).map(|entry| entry.value)
    }

    /// Full entry without side effects; `None` if absent or expired
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let state = self.state();
        state
            .entries
            .peek(key)
            .filter(|entry| !entry.is_expired())
            .cloned()
    }

    /// First live entry (most recent first) matching `predicate`, without side effects
    pub fn find<F>(&self, mut predicate: F) -> Option<(CacheKey, T)>
    where
        F: FnMut(&str, &T) -> bool,
    {
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .find(|(key, entry)| predicate(*key, &entry.value))
            .map(|(key, entry)| (key.to_string(), entry.value.clone()))
    }

    /// Live keys, most recently used first
    pub fn keys(&self) -> Vec<CacheKey> {
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// Live entries, most recently used first
    pub fn entries(&self) -> Vec<CacheEntry<T>> {
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Map live entries that carry their query text, most recent first,
    /// without cloning values
    pub fn recorded_queries<R, F>(&self, mut f: F) -> Vec<R>
    where
        F: FnMut(&str, &str) -> Option<R>,
    {
        let state = self.state();
        state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter_map(|(key, entry)| {
                let query = entry.metadata.query.as_deref()?;
                f(key, query)
            })
            .collect()
    }

    /// Number of stored entries (expired ones included until discovered)
    pub fn size(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// Current aggregate size estimate
    pub fn size_bytes(&self) -> u64 {
        self.state().size_bytes
    }

    /// Time left before `key` expires
    pub fn get_remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.state().entries.peek(key)?.remaining_ttl()
    }

    /// Evict the least recently used entry, returning its key
    pub fn evict_lru(&self) -> Option<CacheKey> {
        self.state().evict_lru()
    }

    /// Remove every expired entry
    pub fn purge_expired(&self) -> Vec<InvalidationEvent> {
        let mut state = self.state();

        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.to_string())
            .collect();

        if expired.is_empty() {
            return Vec::new();
        }

        for key in &expired {
            state.remove_expired(key);
        }

        debug!("Purged {} expired hot tier entries", expired.len());
        vec![
            InvalidationEvent::new(InvalidationReason::Expired, TierLevel::Hot, expired.clone())
                .with_context(format!("Purged {} expired entries", expired.len())),
        ]
    }

    /// Get tier statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            entries: state.entries.len(),
            size_bytes: state.size_bytes,
            ..state.stats.clone()
        }
    }
}
