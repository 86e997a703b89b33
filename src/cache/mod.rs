//! # Tiered Semantic Cache
//!
//! Memoizes the results of natural-language analysis queries so repeated or
//! near-duplicate queries are answered from storage instead of recomputed.
//!
//! ## Features
//!
//! - **Order-Invariant Keys**: queries are normalized (placeholders, stop words, sorted tokens) before hashing
//! - **Three Tiers**: bounded in-memory LRU, one-file-per-entry JSON store, gzip-compressed archive
//! - **Lazy Expiry**: expired entries are removed when read, or eagerly by `purge_expired`
//! - **Budget Eviction**: disk tiers evict by `lastAccessedAt` before every write that would overflow
//! - **Atomic Writes**: temporary file then rename, so a partial entry is never observed
//! - **Similarity Fallback**: Jaccard, cosine and edit-distance matching over previously seen queries
//!
//! ## Architecture
//!
//! - Tier 1 (`hot`): [`MemoryTier`], synchronous, count and byte bounded
//! - Tier 2 (`warm`): [`WarmTier`], `{root}/{bucket}/{key}.json`
//! - Tier 3 (`cold`): [`ColdTier`], `{root}/{bucket}/{key}.gz`
//!
//! [`TieredCache`] probes them in that order and promotes hits upward.
//!
//! ## Example
//!
//! ```no_run
//! use ouroboros_cache::cache::{AgentId, CacheConfig, QueryType, TieredCache};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .root(".ouroboros/cache")
//!     .memory_max_entries(10_000)
//!     .warm_ttl(Duration::from_secs(6 * 3600))
//!     .build();
//!
//! let cache: TieredCache<String> = TieredCache::open(config).await?;
//!
//! cache
//!     .store("why is the planner slow", AgentId::Zen, QueryType::Research, "missing index".to_string())
//!     .await?;
//!
//! if let Some(hit) = cache.lookup("planner slow why", AgentId::Zen, QueryType::Research).await {
//!     println!("Cache hit from {:?}: {}", hit.source, hit.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod compressed;
pub mod config;
pub mod disk;
pub mod entry;
pub mod file_store;
pub mod invalidation;
pub mod key;
pub mod lru;
pub mod memory;
pub mod similarity;
pub mod tier;
pub mod tiered;
pub mod types;

pub use compressed::{ArchiveCodec, ColdTier, CompressionStats};
pub use config::{
    CacheConfig, CacheConfigBuilder, ColdTierConfig, CompressionAlgorithm, DiskTierConfig, MemoryTierConfig,
};
pub use disk::{JsonCodec, WarmTier};
pub use entry::{CacheEntry, CacheMetadata, CompressionInfo};
pub use file_store::{EntryCodec, WriteReport};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use key::{AgentId, KeyGenerator, ParsedKey, QueryType};
pub use memory::MemoryTier;
pub use similarity::{SimilarQuery, SimilarityMatcher, DEFAULT_SIMILARITY_THRESHOLD};
pub use tier::CacheTier;
pub use tiered::{spawn_auto_cleanup, CacheLookup, LookupSource, TieredCache, TieredStats};
pub use types::{CacheKey, CacheStats, CacheValue, TierLevel};
