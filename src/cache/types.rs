//! Core type definitions for the cache system

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - `{agent}_{queryType}_{hash16}` for generated keys
pub type CacheKey = String;

/// Bound for anything storable in a tier.
///
/// Values are opaque to the cache; they only need to survive a JSON round trip
/// for the disk tiers and a clone for the memory tier.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Statistics and metrics for cache performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Total number of successful sets
    pub sets: u64,

    /// Number of entries currently in the tier
    pub entries: usize,

    /// Tracked size of the tier in bytes
    pub size_bytes: u64,

    /// Number of evictions by the recency policy (count or byte budget)
    pub evictions_size: u64,

    /// Number of entries removed because their TTL elapsed
    pub evictions_ttl: u64,

    /// Number of explicit deletes and clears
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Calculate total evictions
    pub fn total_evictions(&self) -> u64 {
        self.evictions_size + self.evictions_ttl
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, sets: {}, entries: {}, size: {} bytes, evictions: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.sets,
            self.entries,
            self.size_bytes,
            self.total_evictions()
        )
    }
}

/// Tier of the cache hierarchy, ordered from cheapest to most expensive probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    /// Tier 1: bounded in-memory LRU
    Hot,

    /// Tier 2: one JSON file per entry
    Warm,

    /// Tier 3: one compressed file per entry
    Cold,
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierLevel::Hot => write!(f, "hot"),
            TierLevel::Warm => write!(f, "warm"),
            TierLevel::Cold => write!(f, "cold"),
        }
    }
}
