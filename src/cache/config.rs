//! Configuration for the tiered cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const HOUR: u64 = 3600;
const DAY: u64 = 24 * HOUR;

/// Limits for the hot (in-memory) tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryTierConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Maximum aggregate estimated size in bytes
    pub max_size_bytes: u64,

    /// Lifetime for entries set without an explicit TTL
    pub default_ttl: Duration,
}

impl Default for MemoryTierConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            // 50 MB
            max_size_bytes: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(HOUR),
        }
    }
}

/// Limits and location of a file-backed tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskTierConfig {
    /// Root directory; shards live directly beneath it
    pub root: PathBuf,

    /// Byte budget for the files under `root`, in megabytes
    pub max_size_mb: u64,

    /// Lifetime for entries set without an explicit TTL
    pub default_ttl: Duration,

    /// Capacity of the access-metadata refresh queue
    pub refresh_queue_capacity: usize,
}

impl DiskTierConfig {
    /// Warm tier defaults under `root`
    pub fn warm(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size_mb: 100,
            default_ttl: Duration::from_secs(DAY),
            refresh_queue_capacity: 256,
        }
    }

    /// Budget in bytes
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Codec for cold-tier files
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// `{key}.gz`, levels 0-9
    #[default]
    Gzip,
    /// `{key}.zst`, levels 1-22
    Zstd,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Zstd => "zstd",
        }
    }

    /// File extension, without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gz",
            CompressionAlgorithm::Zstd => "zst",
        }
    }

    /// Accepted compression levels
    pub fn levels(&self) -> RangeInclusive<i32> {
        match self {
            CompressionAlgorithm::Gzip => 0..=9,
            CompressionAlgorithm::Zstd => 1..=22,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cold tier: a disk tier plus compression settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColdTierConfig {
    pub disk: DiskTierConfig,

    pub algorithm: CompressionAlgorithm,

    /// Level for `algorithm`; see [`CompressionAlgorithm::levels`]
    pub compression_level: i32,
}

impl ColdTierConfig {
    /// Cold tier defaults under `root`
    pub fn archive(root: impl Into<PathBuf>) -> Self {
        Self {
            disk: DiskTierConfig {
                root: root.into(),
                max_size_mb: 1024,
                default_ttl: Duration::from_secs(30 * DAY),
                refresh_queue_capacity: 256,
            },
            algorithm: CompressionAlgorithm::Gzip,
            compression_level: 6,
        }
    }
}

/// Configuration for the tiered cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Hot tier limits
    pub memory: MemoryTierConfig,

    /// Warm tier (JSON files)
    pub warm: DiskTierConfig,

    /// Cold tier (compressed files)
    pub cold: ColdTierConfig,

    /// Minimum Jaccard score for a similarity fallback hit (0.0 - 1.0)
    pub similarity_threshold: f64,

    /// TTL jitter factor (0.0 - 1.0); 0 keeps `expiresAt = createdAt + ttl` exact
    pub ttl_jitter: f64,

    /// Copy lower-tier hits into faster tiers
    pub promote_on_hit: bool,

    /// Also write new entries to the cold tier
    pub write_through_cold: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::with_root(".ouroboros/cache")
    }
}

impl CacheConfig {
    /// Defaults with warm and cold tiers under `root/l2` and `root/l3`
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            memory: MemoryTierConfig::default(),
            warm: DiskTierConfig::warm(root.join("l2")),
            cold: ColdTierConfig::archive(root.join("l3")),
            similarity_threshold: 0.8,
            ttl_jitter: 0.0,
            promote_on_hit: true,
            write_through_cold: true,
        }
    }

    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.memory.max_entries == 0 {
            return Err(CacheError::ConfigError(
                "memory.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.memory.max_size_bytes == 0 {
            return Err(CacheError::ConfigError(
                "memory.max_size_bytes must be greater than 0".to_string(),
            ));
        }

        for (name, disk) in [("warm", &self.warm), ("cold", &self.cold.disk)] {
            if disk.max_size_mb == 0 {
                return Err(CacheError::ConfigError(format!(
                    "{}.max_size_mb must be greater than 0",
                    name
                )));
            }
            if disk.refresh_queue_capacity == 0 {
                return Err(CacheError::ConfigError(format!(
                    "{}.refresh_queue_capacity must be greater than 0",
                    name
                )));
            }
        }

        if self.warm.root == self.cold.disk.root {
            return Err(CacheError::ConfigError(
                "warm and cold tiers must use different roots".to_string(),
            ));
        }

        let levels = self.cold.algorithm.levels();
        if !levels.contains(&self.cold.compression_level) {
            return Err(CacheError::ConfigError(format!(
                "cold.compression_level must be between {} and {} for {}",
                levels.start(),
                levels.end(),
                self.cold.algorithm
            )));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CacheError::ConfigError(
                "similarity_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the configured jitter to `base`
    pub fn ttl_with_jitter(&self, base: Duration) -> Duration {
        if self.ttl_jitter == 0.0 {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(0.001);

        Duration::try_from_secs_f64(final_secs).unwrap_or(Duration::MAX)
    }

    /// Load overrides from the environment (and a `.env` file, if present)
    ///
    /// Recognized variables:
    /// - `OUROBOROS_CACHE_ROOT`
    /// - `OUROBOROS_CACHE_MEMORY_MAX_ENTRIES`
    /// - `OUROBOROS_CACHE_WARM_MAX_MB`
    /// - `OUROBOROS_CACHE_COLD_MAX_MB`
    /// - `OUROBOROS_CACHE_SIMILARITY_THRESHOLD`
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var("OUROBOROS_CACHE_ROOT") {
            Ok(root) => Self::with_root(root),
            Err(_) => Self::default(),
        };

        if let Some(v) = env_parse("OUROBOROS_CACHE_MEMORY_MAX_ENTRIES")? {
            config.memory.max_entries = v;
        }
        if let Some(v) = env_parse("OUROBOROS_CACHE_WARM_MAX_MB")? {
            config.warm.max_size_mb = v;
        }
        if let Some(v) = env_parse("OUROBOROS_CACHE_COLD_MAX_MB")? {
            config.cold.disk.max_size_mb = v;
        }
        if let Some(v) = env_parse("OUROBOROS_CACHE_SIMILARITY_THRESHOLD")? {
            config.similarity_threshold = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CacheError::ConfigError(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    root: Option<PathBuf>,
    memory_max_entries: Option<usize>,
    memory_max_size_bytes: Option<u64>,
    memory_ttl: Option<Duration>,
    warm_max_size_mb: Option<u64>,
    warm_ttl: Option<Duration>,
    cold_max_size_mb: Option<u64>,
    cold_ttl: Option<Duration>,
    compression_algorithm: Option<CompressionAlgorithm>,
    compression_level: Option<i32>,
    refresh_queue_capacity: Option<usize>,
    similarity_threshold: Option<f64>,
    ttl_jitter: Option<f64>,
    promote_on_hit: Option<bool>,
    write_through_cold: Option<bool>,
}

impl CacheConfigBuilder {
    /// Base directory for the warm (`l2`) and cold (`l3`) tiers
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn memory_max_entries(mut self, max: usize) -> Self {
        self.memory_max_entries = Some(max);
        self
    }

    pub fn memory_max_size_bytes(mut self, size: u64) -> Self {
        self.memory_max_size_bytes = Some(size);
        self
    }

    pub fn memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl = Some(ttl);
        self
    }

    pub fn warm_max_size_mb(mut self, size: u64) -> Self {
        self.warm_max_size_mb = Some(size);
        self
    }

    pub fn warm_ttl(mut self, ttl: Duration) -> Self {
        self.warm_ttl = Some(ttl);
        self
    }

    pub fn cold_max_size_mb(mut self, size: u64) -> Self {
        self.cold_max_size_mb = Some(size);
        self
    }

    pub fn cold_ttl(mut self, ttl: Duration) -> Self {
        self.cold_ttl = Some(ttl);
        self
    }

    pub fn compression_algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.compression_algorithm = Some(algorithm);
        self
    }

    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    pub fn refresh_queue_capacity(mut self, capacity: usize) -> Self {
        self.refresh_queue_capacity = Some(capacity);
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }

    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn promote_on_hit(mut self, enable: bool) -> Self {
        self.promote_on_hit = Some(enable);
        self
    }

    pub fn write_through_cold(mut self, enable: bool) -> Self {
        self.write_through_cold = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let mut config = match self.root {
            Some(root) => CacheConfig::with_root(root),
            None => CacheConfig::default(),
        };

        if let Some(v) = self.memory_max_entries {
            config.memory.max_entries = v;
        }
        if let Some(v) = self.memory_max_size_bytes {
            config.memory.max_size_bytes = v;
        }
        if let Some(v) = self.memory_ttl {
            config.memory.default_ttl = v;
        }
        if let Some(v) = self.warm_max_size_mb {
            config.warm.max_size_mb = v;
        }
        if let Some(v) = self.warm_ttl {
            config.warm.default_ttl = v;
        }
        if let Some(v) = self.cold_max_size_mb {
            config.cold.disk.max_size_mb = v;
        }
        if let Some(v) = self.cold_ttl {
            config.cold.disk.default_ttl = v;
        }
        if let Some(v) = self.compression_algorithm {
            config.cold.algorithm = v;
        }
        if let Some(v) = self.compression_level {
            config.cold.compression_level = v;
        }
        if let Some(v) = self.refresh_queue_capacity {
            config.warm.refresh_queue_capacity = v;
            config.cold.disk.refresh_queue_capacity = v;
        }
        if let Some(v) = self.similarity_threshold {
            config.similarity_threshold = v;
        }
        if let Some(v) = self.ttl_jitter {
            config.ttl_jitter = v;
        }
        if let Some(v) = self.promote_on_hit {
            config.promote_on_hit = v;
        }
        if let Some(v) = self.write_through_cold {
            config.write_through_cold = v;
        }

        config
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Memory-constrained environments
    pub fn small(root: impl AsRef<Path>) -> Self {
        let mut config = Self::with_root(root);
        config.memory.max_entries = 100;
        config.memory.max_size_bytes = 5 * 1024 * 1024;
        config.warm.max_size_mb = 10;
        config.cold.disk.max_size_mb = 50;
        config
    }

    /// Short lifetimes and tiny budgets, for tests and throwaway runs
    pub fn ephemeral(root: impl AsRef<Path>) -> Self {
        let mut config = Self::with_root(root);
        config.memory.max_entries = 64;
        config.memory.max_size_bytes = 1024 * 1024;
        config.memory.default_ttl = Duration::from_secs(60);
        config.warm.max_size_mb = 1;
        config.warm.default_ttl = Duration::from_secs(300);
        config.cold.disk.max_size_mb = 4;
        config.cold.disk.default_ttl = Duration::from_secs(3000);
        config
    }

    /// Long-horizon archive: large cold budget, higher compression
    pub fn archival(root: impl AsRef<Path>) -> Self {
        let mut config = Self::with_root(root);
        config.warm.max_size_mb = 512;
        config.cold.disk.max_size_mb = 10 * 1024;
        config.cold.disk.default_ttl = Duration::from_secs(90 * DAY);
        config.cold.compression_level = 9;
        config
    }
}
