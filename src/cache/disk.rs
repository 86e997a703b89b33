//! Tier 2: warm on-disk cache, one JSON file per entry

use crate::cache::{
    config::DiskTierConfig,
    entry::CacheEntry,
    file_store::{EntryCodec, FileStore, WriteReport},
    invalidation::InvalidationEvent,
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stores entry JSON as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EntryCodec for JsonCodec {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, json: &[u8]) -> Result<Vec<u8>> {
        Ok(json.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}

/// Warm tier: `{root}/{bucket}/{key}.json`, bounded by `max_size_mb`
pub struct WarmTier<T> {
    store: FileStore<T, JsonCodec>,
}

impl<T: CacheValue> WarmTier<T> {
    /// Open the tier, creating its root and recomputing the tracked size
    pub async fn open(config: DiskTierConfig) -> Result<Self> {
        let store = FileStore::open(config, JsonCodec, TierLevel::Warm).await?;
        Ok(Self { store })
    }

    pub fn config(&self) -> &DiskTierConfig {
        self.store.config()
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Path the entry for `key` is stored at
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        self.store.path_for(key)
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Read an entry, queueing an access-metadata refresh on hit
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get_entry(key).await
    }

    pub async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.peek_entry(key).await
    }

    pub async fn set(&self, key: impl Into<CacheKey>, value: T, ttl: Option<Duration>) -> Result<WriteReport> {
        self.store.set(key, value, ttl).await
    }

    pub async fn insert_entry(&self, entry: CacheEntry<T>) -> Result<WriteReport> {
        self.store.insert_entry(entry).await
    }

    pub async fn has(&self, key: &str) -> bool {
        self.store.has(key).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
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

    /// Tracked bytes on disk
    pub fn size_bytes(&self) -> u64 {
        self.store.size_bytes()
    }

    /// Wait for queued access refreshes to land
    pub async fn flush_refreshes(&self) {
        self.store.flush_refreshes().await
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Finding {
        title: String,
        score: u32,
    }

    fn finding(title: &str) -> Finding {
        Finding {
            title: title.to_string(),
            score: 7,
        }
    }

    fn config(root: &Path) -> DiskTierConfig {
        DiskTierConfig {
            root: root.to_path_buf(),
            max_size_mb: 1,
            default_ttl: Duration::from_secs(3600),
            refresh_queue_capacity: 32,
        }
    }

    async fn tier(root: &Path) -> WarmTier<Finding> {
        WarmTier::open(config(root)).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("TAN_analysis_0123456789abcdef", finding("race"), None)
            .await
            .unwrap();

        assert_eq!(
            warm.get("TAN_analysis_0123456789abcdef").await,
            Some(finding("race"))
        );
        assert!(warm.has("TAN_analysis_0123456789abcdef").await);
    }

    #[tokio::test]
    async fn test_file_layout_uses_bucket_and_json_extension() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;
        let key = "ZEN_pattern_fedcba9876543210";

        warm.set(key, finding("layout"), None).await.unwrap();

        let path = warm.path_for(key).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "json");
        let bucket = path.parent().unwrap().file_name().unwrap().to_str().unwrap();
        assert_eq!(bucket.len(), 3);
        assert_eq!(path.parent().unwrap().parent().unwrap(), tmp.path());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"lastAccessedAt\""));
    }

    #[tokio::test]
    async fn test_expired_entry_is_deleted_on_get() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("k1", finding("short"), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(warm.get("k1").await, None);
        assert!(!warm.has("k1").await);
        assert!(!warm.path_for("k1").unwrap().exists());
        assert_eq!(warm.size_bytes(), 0);

        let stats = warm.stats().await;
        assert_eq!(stats.evictions_ttl, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_get_refreshes_access_metadata_in_background() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("k1", finding("refresh"), None).await.unwrap();
        let before = warm.peek_entry("k1").await.unwrap();

        assert!(warm.get_entry("k1").await.is_some());
        assert!(warm.get_entry("k1").await.is_some());
        warm.flush_refreshes().await;

        let after = warm.peek_entry("k1").await.unwrap();
        assert_eq!(after.access_count, 2);
        assert!(after.last_accessed_at >= before.last_accessed_at);
        assert_eq!(after.created_at, before.created_at);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_miss_and_kept() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("k1", finding("ok"), None).await.unwrap();
        let path = warm.path_for("k1").unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        assert_eq!(warm.get("k1").await, None);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_delete_updates_size() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("k1", finding("a"), None).await.unwrap();
        warm.set("k2", finding("b"), None).await.unwrap();
        let both = warm.size_bytes();

        assert!(warm.delete("k1").await.unwrap());
        assert!(!warm.delete("k1").await.unwrap());
        assert!(warm.size_bytes() < both);
        assert_eq!(warm.keys().await.unwrap(), vec!["k2".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_double_count() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        let first = warm.set("k1", finding("same"), None).await.unwrap();
        let second = warm.set("k1", finding("same"), None).await.unwrap();

        assert_eq!(first.stored_bytes, second.stored_bytes);
        assert_eq!(warm.size_bytes(), second.stored_bytes);
    }

    #[tokio::test]
    async fn test_eviction_keeps_within_budget() {
        let tmp = TempDir::new().unwrap();
        let warm: WarmTier<String> = WarmTier::open(config(tmp.path())).await.unwrap();
        let payload = "x".repeat(300 * 1024);

        for i in 0..3 {
            warm.set(format!("k{}", i), payload.clone(), None).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // touch k1 so k2 becomes the oldest after k0
        assert!(warm.get("k1").await.is_some());
        warm.flush_refreshes().await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        let report = warm.set("k3", payload.clone(), None).await.unwrap();
        assert_eq!(report.evicted, vec!["k0".to_string()]);
        assert!(warm.size_bytes() <= warm.config().max_size_bytes());

        let report = warm.set("k4", payload, None).await.unwrap();
        assert_eq!(report.evicted, vec!["k2".to_string()]);
        assert!(warm.size_bytes() <= warm.config().max_size_bytes());
        assert!(warm.has("k1").await);
        assert!(warm.stats().await.evictions_size >= 2);
    }

    #[tokio::test]
    async fn test_failed_write_is_reported_and_not_counted() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;
        warm.set("k1", finding("kept"), None).await.unwrap();
        let size_before = warm.size_bytes();

        // a directory at the entry path makes the final rename fail
        let blocked = warm.path_for("k2").unwrap();
        std::fs::create_dir_all(blocked.join("occupied")).unwrap();

        let result = warm.set("k2", finding("lost"), None).await;
        assert!(matches!(result, Err(CacheError::WriteError { ref key, .. }) if key == "k2"));
        assert_eq!(warm.size_bytes(), size_before);
        assert_eq!(warm.stats().await.sets, 1);
        assert_eq!(warm.get("k1").await, Some(finding("kept")));
    }

    #[tokio::test]
    async fn test_entry_larger_than_budget_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let warm: WarmTier<String> = WarmTier::open(config(tmp.path())).await.unwrap();

        let result = warm.set("big", "y".repeat(2 * 1024 * 1024), None).await;
        assert!(matches!(result, Err(CacheError::EntryTooLarge { .. })));
        assert!(!warm.has("big").await);
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("k1", finding("a"), None).await.unwrap();
        warm.get("k1").await;
        warm.clear().await.unwrap();

        assert!(tmp.path().exists());
        assert_eq!(warm.size_bytes(), 0);
        assert!(warm.keys().await.unwrap().is_empty());
        let stats = warm.stats().await;
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.sets, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let tmp = TempDir::new().unwrap();
        let warm = tier(tmp.path()).await;

        warm.set("short", finding("a"), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        warm.set("long", finding("b"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let events = warm.purge_expired().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].keys, vec!["short".to_string()]);
        assert_eq!(warm.keys().await.unwrap(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_unwritable_root_fails_to_open() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let result = WarmTier::<Finding>::open(config(&blocker.join("cache"))).await;
        assert!(matches!(result, Err(CacheError::InitializationError { .. })));
    }
}
