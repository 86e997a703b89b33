//! # Ouroboros Cache (ouroboros-cache)
//!
//! A tiered semantic cache for the results of expensive, natural-language
//! keyed analysis queries.
//!
//! ## Features
//!
//! - Deterministic, word-order invariant cache keys (`{agent}_{queryType}_{hash16}`)
//! - Hot in-memory LRU tier with entry-count and byte limits
//! - Warm on-disk tier, one JSON file per entry in 4096 shard directories
//! - Cold gzip-compressed archive tier with compression feedback
//! - Similarity fallback when no exact key matches
//! - Async-first design using tokio
//!
//! ## Key Derivation
//!
//! ```
//! use ouroboros_cache::{AgentId, KeyGenerator, QueryType};
//!
//! let keys = KeyGenerator::new();
//! let a = keys.generate_key("find bugs in the code", AgentId::Tan, QueryType::Analysis);
//! let b = keys.generate_key("code bugs find", AgentId::Tan, QueryType::Analysis);
//!
//! assert_eq!(a, b);
//! assert!(keys.is_valid_key(&a));
//! assert_eq!(keys.bucket_of(&a).len(), 3);
//! ```
//!
//! ## Similarity Matching
//!
//! ```
//! use ouroboros_cache::SimilarityMatcher;
//!
//! let matcher = SimilarityMatcher::new();
//! let candidates = ["audit login flow", "review auth flow", "css grid layout"];
//!
//! let best = matcher.find_best_match("review the auth flow", &candidates, 0.8).unwrap();
//! assert_eq!(best.query, "review auth flow");
//! ```
//!
//! ## Tiered Lookup
//!
//! ```no_run
//! use ouroboros_cache::{AgentId, CacheConfig, QueryType, TieredCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache: TieredCache<serde_json::Value> =
//!         TieredCache::open(CacheConfig::from_env()?).await?;
//!
//!     let query = "detect memory leaks in the worker pool";
//!     match cache.lookup(query, AgentId::Ino, QueryType::Investigation).await {
//!         Some(hit) => println!("cached: {}", hit.value),
//!         None => {
//!             let fresh = serde_json::json!({ "leaks": 0 });
//!             cache.store(query, AgentId::Ino, QueryType::Investigation, fresh).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    spawn_auto_cleanup, AgentId, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheLookup,
    CacheMetadata, CacheStats, CacheTier, CacheValue, ColdTier, CompressionStats, InvalidationEvent,
    InvalidationReason, KeyGenerator, LookupSource, MemoryTier, QueryType, SimilarityMatcher,
    TierLevel, TieredCache, TieredStats, WarmTier,
};
pub use error::{CacheError, Result};
