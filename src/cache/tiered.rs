//! Three-tier cache front end
//!
//! `TieredCache` derives keys from queries, probes hot → warm → cold,
//! promotes lower-tier hits into faster tiers and, when every tier misses,
//! falls back to the closest previously seen query of the same agent and
//! query type.
//!
//! # Example
//!
//! ```no_run
//! use ouroboros_cache::cache::{AgentId, CacheConfig, QueryType, TieredCache};
//!
//! # async fn demo() -> ouroboros_cache::Result<()> {
//! let cache: TieredCache<String> = TieredCache::open(CacheConfig::with_root("/tmp/cache")).await?;
//!
//! cache
//!     .store("find bugs in the code", AgentId::Tan, QueryType::Analysis, "3 bugs".to_string())
//!     .await?;
//!
//! let hit = cache.lookup("code bugs find", AgentId::Tan, QueryType::Analysis).await;
//! assert_eq!(hit.map(|h| h.value), Some("3 bugs".to_string()));
//! # Ok(())
//! # }
//! ```

use crate::cache::{
    compressed::{ColdTier, CompressionStats},
    config::CacheConfig,
    disk::WarmTier,
    entry::CacheEntry,
    invalidation::{InvalidationEvent, InvalidationReason},
    key::{AgentId, KeyGenerator, QueryType},
    memory::MemoryTier,
    similarity::SimilarityMatcher,
    tier::CacheTier,
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where a lookup was answered from
#[derive(Debug, Clone, PartialEq)]
pub enum LookupSource {
    /// Exact key hit in a tier
    Tier(TierLevel),

    /// No exact hit; a cached query of the same agent and type was close enough
    Similar { score: f64, matched_key: CacheKey },
}

/// Result of a successful lookup
#[derive(Debug, Clone)]
pub struct CacheLookup<T> {
    /// Key the value was stored under
    pub key: CacheKey,
    pub value: T,
    pub source: LookupSource,
}

impl<T> CacheLookup<T> {
    pub fn is_exact(&self) -> bool {
        matches!(self.source, LookupSource::Tier(_))
    }
}

/// Per-tier statistics plus orchestrator counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TieredStats {
    pub memory: CacheStats,
    pub warm: CacheStats,
    pub cold: CacheStats,
    pub compression: CompressionStats,
    pub lookups: u64,
    pub promotions: u64,
    pub similar_hits: u64,
}

impl TieredStats {
    pub fn total_hits(&self) -> u64 {
        self.memory.hits + self.warm.hits + self.cold.hits
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.memory.size_bytes + self.warm.size_bytes + self.cold.size_bytes
    }
}

impl std::fmt::Display for TieredStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Lookups: {} (promotions: {}, similar hits: {})", self.lookups, self.promotions, self.similar_hits)?;
        writeln!(f, "[hot]  {}", self.memory)?;
        writeln!(f, "[warm] {}", self.warm)?;
        writeln!(f, "[cold] {}", self.cold)?;
        write!(f, "{}", self.compression)
    }
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    promotions: AtomicU64,
    similar_hits: AtomicU64,
}

/// Hot, warm and cold tiers behind one lookup/store API
pub struct TieredCache<T> {
    config: CacheConfig,
    keys: KeyGenerator,
    matcher: SimilarityMatcher,
    memory: MemoryTier<T>,
    warm: WarmTier<T>,
    cold: ColdTier<T>,
    counters: Counters,
}

impl<T: CacheValue> TieredCache<T> {
    /// Validate the configuration and open every tier
    pub async fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let memory = MemoryTier::new(config.memory.clone());
        let warm = WarmTier::open(config.warm.clone()).await?;
        let cold = ColdTier::open(config.cold.clone()).await?;

        info!(
            "Tiered cache ready (warm: {:?}, cold: {:?}, similarity threshold: {})",
            config.warm.root, config.cold.disk.root, config.similarity_threshold
        );

        Ok(Self {
            matcher: SimilarityMatcher::with_threshold(config.similarity_threshold),
            keys: KeyGenerator::new(),
            config,
            memory,
            warm,
            cold,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn matcher(&self) -> &SimilarityMatcher {
        &self.matcher
    }

    pub fn memory(&self) -> &MemoryTier<T> {
        &self.memory
    }

    pub fn warm(&self) -> &WarmTier<T> {
        &self.warm
    }

    pub fn cold(&self) -> &ColdTier<T> {
        &self.cold
    }

    /// Every tier, cheapest first
    pub fn tiers(&self) -> [&dyn CacheTier<T>; 3] {
        [&self.memory, &self.warm, &self.cold]
    }

    /// Key a query would be stored under
    pub fn key_for(&self, query: &str, agent: AgentId, query_type: QueryType) -> CacheKey {
        self.keys.generate_key(query, agent, query_type)
    }

    /// Exact lookup across tiers, then similarity fallback
    pub async fn lookup(&self, query: &str, agent: AgentId, query_type: QueryType) -> Option<CacheLookup<T>> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);

        let key = self.key_for(query, agent, query_type);
        if let Some(hit) = self.probe(&key).await {
            return Some(hit);
        }

        self.similar(query, agent, query_type, &key)
    }

    /// Exact lookup by key, promoting lower-tier hits
    pub async fn get_by_key(&self, key: &str) -> Option<CacheLookup<T>> {
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        self.probe(key).await
    }

    async fn probe(&self, key: &str) -> Option<CacheLookup<T>> {
        if let Some(entry) = self.memory.get_entry(key) {
            return Some(Self::hit(entry, TierLevel::Hot));
        }

        if let Some(entry) = self.warm.get_entry(key).await {
            self.promote(&entry, TierLevel::Warm).await;
            return Some(Self::hit(entry, TierLevel::Warm));
        }

        if let Some(entry) = self.cold.get_entry(key).await {
            self.promote(&entry, TierLevel::Cold).await;
            return Some(Self::hit(entry, TierLevel::Cold));
        }

        debug!("Tiered miss: {}", key);
        None
    }

    fn hit(entry: CacheEntry<T>, level: TierLevel) -> CacheLookup<T> {
        CacheLookup {
            key: entry.key,
            value: entry.value,
            source: LookupSource::Tier(level),
        }
    }

    /// Copy a lower-tier hit into every faster tier, keeping its expiry.
    /// Failures only cost the speedup and are logged.
    async fn promote(&self, entry: &CacheEntry<T>, from: TierLevel) {
        if !self.config.promote_on_hit {
            return;
        }

        let mut copy = entry.clone();
        copy.metadata.compression = None;

        if from == TierLevel::Cold {
            if let Err(e) = self.warm.insert_entry(copy.clone()).await {
                warn!("Failed to promote {} into warm tier: {}", entry.key, e);
            }
        }
        if let Err(e) = self.memory.insert_entry(copy) {
            warn!("Failed to promote {} into hot tier: {}", entry.key, e);
            return;
        }

        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
        debug!("Promoted {} from {} tier", entry.key, from);
    }

    /// Best hot-tier entry of the same agent and query type whose recorded
    /// query meets the similarity threshold
    fn similar(&self, query: &str, agent: AgentId, query_type: QueryType, key: &str) -> Option<CacheLookup<T>> {
        let candidates: Vec<(CacheKey, String)> = self.memory.recorded_queries(|candidate, recorded| {
            if candidate == key {
                return None;
            }
            let parsed = self.keys.parse_key(candidate)?;
            (parsed.agent == agent && parsed.query_type == query_type)
                .then(|| (candidate.to_string(), recorded.to_string()))
        });

        if candidates.is_empty() {
            return None;
        }

        let queries: Vec<&str> = candidates.iter().map(|(_, q)| q.as_str()).collect();
        let best = self
            .matcher
            .find_best_match(query, &queries, self.matcher.threshold())?;
        let matched_key = candidates[best.index].0.clone();

        // counts as an access of the matched entry
        let entry = self.memory.get_entry(&matched_key)?;
        self.counters.similar_hits.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Similar hit for {}: {} (score {:.2})",
            key, matched_key, best.score
        );

        Some(CacheLookup {
            key: entry.key,
            value: entry.value,
            source: LookupSource::Similar {
                score: best.score,
                matched_key,
            },
        })
    }

    /// Store a query result in the hot and warm tiers (and cold when
    /// `write_through_cold` is set), returning its key.
    ///
    /// Disk write failures are returned. A value too large for the hot tier
    /// is logged and served from disk; any older hot copy is dropped.
    pub async fn store(&self, query: &str, agent: AgentId, query_type: QueryType, value: T) -> Result<CacheKey> {
        let key = self.key_for(query, agent, query_type);
        self.write_through(&key, value, Some(query)).await?;
        Ok(key)
    }

    /// Store under an explicit key, e.g. one from
    /// [`KeyGenerator::investigation_key`]
    pub async fn store_by_key(&self, key: &str, value: T) -> Result<()> {
        self.write_through(key, value, None).await
    }

    async fn write_through(&self, key: &str, value: T, query: Option<&str>) -> Result<()> {
        let build = |value: T, ttl: Duration| {
            let entry = CacheEntry::new(key, value, self.config.ttl_with_jitter(ttl));
            match query {
                Some(q) => entry.with_query(q),
                None => entry,
            }
        };

        if let Err(e) = self
            .memory
            .insert_entry(build(value.clone(), self.config.memory.default_ttl))
        {
            warn!("Skipping hot tier for {}: {}", key, e);
        }

        if self.config.write_through_cold {
            self.warm
                .insert_entry(build(value.clone(), self.config.warm.default_ttl))
                .await?;
            self.cold
                .insert_entry(build(value, self.config.cold.disk.default_ttl))
                .await?;
        } else {
            self.warm
                .insert_entry(build(value, self.config.warm.default_ttl))
                .await?;
        }

        debug!("Stored {}", key);
        Ok(())
    }

    /// Whether any tier holds a live entry for `key`
    pub async fn contains(&self, key: &str) -> bool {
        for tier in self.tiers() {
            if tier.has(key).await {
                return true;
            }
        }
        false
    }

    /// Delete `key` from every tier; returns whether any tier held it
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut removed = false;
        for tier in self.tiers() {
            removed |= tier.delete(key).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        for tier in self.tiers() {
            tier.clear().await?;
        }
        info!("Cleared all cache tiers");
        Ok(())
    }

    /// Remove every key generated for `agent` from every tier.
    /// Keys that do not parse are left alone.
    pub async fn invalidate_agent(&self, agent: AgentId) -> Result<Vec<InvalidationEvent>> {
        let mut events = Vec::new();

        for tier in self.tiers() {
            let mut removed = Vec::new();
            for key in tier.keys().await? {
                let owned = self
                    .keys
                    .parse_key(&key)
                    .is_some_and(|parsed| parsed.agent == agent);
                if owned && tier.delete(&key).await? {
                    removed.push(key);
                }
            }

            if !removed.is_empty() {
                info!("Invalidated {} {} tier entries of {}", removed.len(), tier.level(), agent);
                events.push(InvalidationEvent::new(
                    InvalidationReason::AgentPurge { agent },
                    tier.level(),
                    removed,
                ));
            }
        }

        Ok(events)
    }

    /// Remove expired entries from every tier
    pub async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        let mut events = Vec::new();
        for tier in self.tiers() {
            events.extend(tier.purge_expired().await?);
        }
        Ok(events)
    }

    /// Wait for pending disk access refreshes
    pub async fn flush_refreshes(&self) {
        self.warm.flush_refreshes().await;
        self.cold.flush_refreshes().await;
    }

    pub async fn stats(&self) -> TieredStats {
        TieredStats {
            memory: self.memory.stats(),
            warm: self.warm.stats().await,
            cold: self.cold.stats().await,
            compression: self.cold.compression_stats(),
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            similar_hits: self.counters.similar_hits.load(Ordering::Relaxed),
        }
    }
}

/// Periodically purge expired entries from every tier
pub fn spawn_auto_cleanup<T: CacheValue>(cache: Arc<TieredCache<T>>, interval: Duration) -> JoinHandle<()> {
    info!("Starting automatic cache cleanup task (interval: {:?})", interval);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match cache.purge_expired().await {
                Ok(events) => {
                    if !events.is_empty() {
                        debug!("Auto cleanup: {} events", events.len());
                    }
                }
                Err(e) => {
                    warn!("Auto cleanup failed: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cache(root: &std::path::Path) -> TieredCache<String> {
        TieredCache::open(CacheConfig::with_root(root)).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_then_lookup_reordered_query() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        cache
            .store("find bugs in the code", AgentId::Tan, QueryType::Analysis, "3 bugs".to_string())
            .await
            .unwrap();

        let hit = cache
            .lookup("code bugs find", AgentId::Tan, QueryType::Analysis)
            .await
            .unwrap();
        assert_eq!(hit.value, "3 bugs");
        assert_eq!(hit.source, LookupSource::Tier(TierLevel::Hot));
    }

    #[tokio::test]
    async fn test_oversized_replacement_never_serves_stale_value() {
        let tmp = TempDir::new().unwrap();
        let mut config = CacheConfig::with_root(tmp.path());
        config.memory.max_size_bytes = 4 * 1024;
        let cache: TieredCache<String> = TieredCache::open(config).await.unwrap();

        let query = "deadlock in connection pool";
        cache
            .store(query, AgentId::Ino, QueryType::Investigation, "old".to_string())
            .await
            .unwrap();

        let new_value = "n".repeat(8192);
        cache
            .store(query, AgentId::Ino, QueryType::Investigation, new_value.clone())
            .await
            .unwrap();

        let hit = cache
            .lookup(query, AgentId::Ino, QueryType::Investigation)
            .await
            .unwrap();
        assert_eq!(hit.value, new_value);
        assert_eq!(hit.source, LookupSource::Tier(TierLevel::Warm));
    }

    #[tokio::test]
    async fn test_warm_hit_is_promoted_with_original_expiry() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        let key = cache
            .store("slow planner", AgentId::Zen, QueryType::Research, "v".to_string())
            .await
            .unwrap();
        let warm_expiry = cache.warm().peek_entry(&key).await.unwrap().expires_at();
        cache.memory().clear();

        let hit = cache.get_by_key(&key).await.unwrap();
        assert_eq!(hit.source, LookupSource::Tier(TierLevel::Warm));
        assert_eq!(cache.memory().peek_entry(&key).unwrap().expires_at(), warm_expiry);

        let again = cache.get_by_key(&key).await.unwrap();
        assert_eq!(again.source, LookupSource::Tier(TierLevel::Hot));
        assert_eq!(cache.stats().await.promotions, 1);
    }

    #[tokio::test]
    async fn test_cold_hit_fills_warm_and_hot() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        let key = cache
            .store("archive lookup", AgentId::Ino, QueryType::Validation, "v".to_string())
            .await
            .unwrap();
        cache.memory().clear();
        cache.warm().clear().await.unwrap();

        let hit = cache.get_by_key(&key).await.unwrap();
        assert_eq!(hit.source, LookupSource::Tier(TierLevel::Cold));
        assert!(cache.warm().has(&key).await);
        assert!(cache.memory().peek(&key).is_some());
        assert!(cache
            .warm()
            .peek_entry(&key)
            .await
            .unwrap()
            .metadata
            .compression
            .is_none());
    }

    #[tokio::test]
    async fn test_similarity_fallback_same_agent_only() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        cache
            .store(
                "review authentication flow tokens session",
                AgentId::Tan,
                QueryType::Analysis,
                "auth report".to_string(),
            )
            .await
            .unwrap();

        let hit = cache
            .lookup(
                "review authentication flow tokens session expiry",
                AgentId::Tan,
                QueryType::Analysis,
            )
            .await
            .unwrap();
        assert!(!hit.is_exact());
        match hit.source {
            LookupSource::Similar { score, .. } => assert!(score >= 0.8),
            other => panic!("unexpected source: {:?}", other),
        }

        let other_agent = cache
            .lookup(
                "review authentication flow tokens session expiry",
                AgentId::Zen,
                QueryType::Analysis,
            )
            .await;
        assert!(other_agent.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_agent_spans_tiers() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        let tan = cache
            .store("memory leak", AgentId::Tan, QueryType::Analysis, "a".to_string())
            .await
            .unwrap();
        let zen = cache
            .store("memory leak", AgentId::Zen, QueryType::Analysis, "b".to_string())
            .await
            .unwrap();
        cache.store_by_key("manual-key", "c".to_string()).await.unwrap();

        let events = cache.invalidate_agent(AgentId::Tan).await.unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.keys == vec![tan.clone()]));

        assert!(!cache.contains(&tan).await);
        assert!(cache.contains(&zen).await);
        assert!(cache.contains("manual-key").await);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(tmp.path()).await;

        let key = cache
            .store("queue depth", AgentId::Juno, QueryType::Pattern, "v".to_string())
            .await
            .unwrap();
        assert!(cache.remove(&key).await.unwrap());
        assert!(!cache.remove(&key).await.unwrap());

        cache
            .store("queue depth", AgentId::Juno, QueryType::Pattern, "v".to_string())
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get_by_key(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_write_through_cold_disabled() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig::builder()
            .root(tmp.path())
            .write_through_cold(false)
            .build();
        let cache: TieredCache<String> = TieredCache::open(config).await.unwrap();

        let key = cache
            .store("hot path", AgentId::Aj, QueryType::Analysis, "v".to_string())
            .await
            .unwrap();
        assert!(cache.warm().has(&key).await);
        assert!(!cache.cold().has(&key).await);
    }
}
