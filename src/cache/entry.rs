//! Cache entry management with TTL support

use crate::cache::types::CacheKey;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed bookkeeping overhead charged to every entry in size estimates
pub const ENTRY_OVERHEAD_BYTES: u64 = std::mem::size_of::<CacheMetadata>() as u64 + 64;

/// A cache entry with TTL and metadata
///
/// The on-disk tiers persist this struct as JSON with camelCase field names and
/// RFC 3339 timestamps, e.g. `"createdAt": "2026-10-19T09:14:02.113Z"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: T,

    /// When the entry was created (or last fully re-set)
    pub created_at: DateTime<Utc>,

    /// Last access time (for LRU tracking)
    pub last_accessed_at: DateTime<Utc>,

    /// Number of successful reads
    pub access_count: u64,

    /// Requested lifetime in milliseconds
    pub ttl: u64,

    /// Entry metadata
    #[serde(default)]
    pub metadata: CacheMetadata,
}

/// Free-form metadata associated with a cache entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Approximate size of the entry in bytes
    pub size_bytes: u64,

    /// Raw query text the entry answers, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Compression feedback recorded by the cold tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionInfo>,
}

/// How a cold-tier entry was compressed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompressionInfo {
    pub algorithm: String,
    pub level: i32,
}

impl<T> CacheEntry<T> {
    /// Create a new cache entry that expires `ttl` from now
    pub fn new(key: impl Into<CacheKey>, value: T, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            key: key.into(),
            value,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            metadata: CacheMetadata::default(),
        }
    }

    /// Attach the raw query text this entry answers
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.metadata.query = Some(query.into());
        self
    }

    /// `createdAt + ttl`
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::milliseconds(i64::try_from(self.ttl).unwrap_or(i64::MAX));
        self.created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check expiry against a fixed instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Get time until expiration, `None` once expired
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let now = Utc::now();
        let expires_at = self.expires_at();
        if now > expires_at {
            None
        } else {
            (expires_at - now).to_std().ok()
        }
    }

    /// Mark the entry as read (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.last_accessed_at = Utc::now();
        self.access_count += 1;
    }

    /// Update recency without counting a read
    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }

}

impl<T: Serialize> CacheEntry<T> {
    /// Approximate in-memory footprint: key + serialized value + fixed overhead
    pub fn estimate_size(&self) -> Result<u64> {
        let value_len = serde_json::to_vec(&self.value)?.len() as u64;
        Ok(self.key.len() as u64 + value_len + ENTRY_OVERHEAD_BYTES)
    }
}
