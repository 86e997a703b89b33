//! Tier 3: cold compressed archive
//!
//! Same layout, eviction and atomic-write rules as the warm tier, but every
//! file holds compressed entry JSON: gzip by default (`{root}/{bucket}/{key}.gz`),
//! or zstd (`{key}.zst`) when configured. Cumulative uncompressed/compressed
//! byte totals are kept so callers can judge whether compression pays for
//! itself on their workload.

use crate::cache::{
    config::{ColdTierConfig, CompressionAlgorithm},
    entry::{CacheEntry, CompressionInfo},
    file_store::{EntryCodec, FileStore, WriteReport},
    invalidation::InvalidationEvent,
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::{CacheError, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Compression codec for cold-tier files
#[derive(Debug, Clone, Copy)]
pub struct ArchiveCodec {
    algorithm: CompressionAlgorithm,
    level: i32,
}

impl ArchiveCodec {
    pub fn new(algorithm: CompressionAlgorithm, level: i32) -> Self {
        Self { algorithm, level }
    }

    pub fn gzip(level: i32) -> Self {
        Self::new(CompressionAlgorithm::Gzip, level)
    }

    pub fn zstd(level: i32) -> Self {
        Self::new(CompressionAlgorithm::Zstd, level)
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

fn compression_error(e: std::io::Error) -> CacheError {
    CacheError::CompressionError(e.to_string())
}

impl EntryCodec for ArchiveCodec {
    fn extension(&self) -> &'static str {
        self.algorithm.extension()
    }

    fn encode(&self, json: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Gzip => {
                let level = Compression::new(self.level.clamp(0, 9) as u32);
                let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), level);
                encoder.write_all(json).map_err(compression_error)?;
                encoder.finish().map_err(compression_error)
            }
            CompressionAlgorithm::Zstd => zstd::encode_all(json, self.level).map_err(compression_error),
        }
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Gzip => {
                let mut json = Vec::with_capacity(stored.len() * 2);
                GzDecoder::new(stored)
                    .read_to_end(&mut json)
                    .map_err(compression_error)?;
                Ok(json)
            }
            CompressionAlgorithm::Zstd => zstd::decode_all(stored).map_err(compression_error),
        }
    }
}

/// Running totals across every cold-tier write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub writes: u64,
}

impl CompressionStats {
    /// `uncompressed / compressed`; 1.0 before any write
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 1.0;
        }
        self.uncompressed_bytes as f64 / self.compressed_bytes as f64
    }

    /// Share of logical bytes not written to disk, as a percentage
    pub fn storage_savings_percent(&self) -> f64 {
        if self.uncompressed_bytes == 0 {
            return 0.0;
        }
        let saved = self.uncompressed_bytes as f64 - self.compressed_bytes as f64;
        (saved / self.uncompressed_bytes as f64) * 100.0
    }

    fn record(&mut self, report: &WriteReport) {
        self.uncompressed_bytes += report.logical_bytes;
        self.compressed_bytes += report.stored_bytes;
        self.writes += 1;
    }
}

impl std::fmt::Display for CompressionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Compression: {} writes, {} -> {} bytes ({:.2}x, {:.1}% saved)",
            self.writes,
            self.uncompressed_bytes,
            self.compressed_bytes,
            self.compression_ratio(),
            self.storage_savings_percent()
        )
    }
}

/// Cold tier backed by compressed files
pub struct ColdTier<T> {
    store: FileStore<T, ArchiveCodec>,
    config: ColdTierConfig,
    compression: Mutex<CompressionStats>,
}

impl<T: CacheValue> ColdTier<T> {
    pub async fn open(config: ColdTierConfig) -> Result<Self> {
        let codec = ArchiveCodec::new(config.algorithm, config.compression_level);
        let store = FileStore::open(config.disk.clone(), codec, TierLevel::Cold).await?;
        Ok(Self {
            store,
            config,
            compression: Mutex::new(CompressionStats::default()),
        })
    }

    pub fn config(&self) -> &ColdTierConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        self.store.path_for(key)
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get_entry(key).await
    }

    pub async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.peek_entry(key).await
    }

    pub async fn set(&self, key: impl Into<CacheKey>, value: T, ttl: Option<Duration>) -> Result<WriteReport> {
        let ttl = ttl.unwrap_or(self.config.disk.default_ttl);
        self.insert_entry(CacheEntry::new(key, value, ttl)).await
    }

    /// Compress and store an entry, recording compression feedback
    pub async fn insert_entry(&self, mut entry: CacheEntry<T>) -> Result<WriteReport> {
        let codec = self.store.codec();
        entry.metadata.compression = Some(CompressionInfo {
            algorithm: codec.algorithm().to_string(),
            level: codec.level(),
        });

        let key = entry.key.clone();
        let report = self.store.insert_entry(entry).await?;
        debug!(
            "Compressed {} from {} to {} bytes",
            key, report.logical_bytes, report.stored_bytes
        );

        self.compression
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&report);
        Ok(report)
    }

    pub async fn has(&self, key: &str) -> bool {
        self.store.has(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    /// Clear files and reset compression totals along with the other counters
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        *self.compression.lock().unwrap_or_else(PoisonError::into_inner) = CompressionStats::default();
        Ok(())
    }

    pub async fn keys(&self) -> Result<Vec<CacheKey>> {
        self.store.keys().await
    }

    pub async fn entries(&self) -> Result<Vec<CacheEntry<T>>> {
        self.store.entries().await
    }

    pub async fn get_remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.store.get_remaining_ttl(key).await
    }

    pub async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        self.store.purge_expired().await
    }

    pub fn size_bytes(&self) -> u64 {
        self.store.size_bytes()
    }

    pub async fn flush_refreshes(&self) {
        self.store.flush_refreshes().await
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }

    pub fn compression_stats(&self) -> CompressionStats {
        *self.compression.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn compression_ratio(&self) -> f64 {
        self.compression_stats().compression_ratio()
    }

    pub fn storage_savings_percent(&self) -> f64 {
        self.compression_stats().storage_savings_percent()
    }
}
