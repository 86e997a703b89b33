//! Common capability interface over the three tiers
//!
//! `TieredCache` drives every tier through `dyn CacheTier<T>` for the
//! operations that fan out (clear, purge, namespace invalidation), so a new
//! backend only needs an impl here.

use crate::cache::{
    compressed::ColdTier,
    disk::WarmTier,
    entry::CacheEntry,
    invalidation::InvalidationEvent,
    memory::MemoryTier,
    types::{CacheKey, CacheStats, CacheValue, TierLevel},
};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait CacheTier<T: CacheValue>: Send + Sync {
    fn level(&self) -> TierLevel;

    /// Read an entry, updating access bookkeeping; expired entries are removed
    async fn get(&self, key: &str) -> Option<CacheEntry<T>>;

    /// Read an entry with no side effects
    async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>>;

    /// Store a value; `None` uses the tier's default TTL
    async fn set(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()>;

    /// Store a prebuilt entry, keeping its timestamps and TTL
    async fn insert_entry(&self, entry: CacheEntry<T>) -> Result<()>;

    async fn has(&self, key: &str) -> bool;

    async fn delete(&self, key: &str) -> Result<bool>;

    async fn clear(&self) -> Result<()>;

    async fn keys(&self) -> Result<Vec<CacheKey>>;

    async fn entries(&self) -> Result<Vec<CacheEntry<T>>>;

    async fn stats(&self) -> CacheStats;

    async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>>;
}

#[async_trait]
impl<T: CacheValue> CacheTier<T> for MemoryTier<T> {
    fn level(&self) -> TierLevel {
        TierLevel::Hot
    }

    async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.get_entry(key)
    }

    async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        MemoryTier::peek_entry(self, key)
    }

    async fn set(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()> {
        MemoryTier::set(self, key, value, ttl)
    }

    async fn insert_entry(&self, entry: CacheEntry<T>) -> Result<()> {
        MemoryTier::insert_entry(self, entry)
    }

    async fn has(&self, key: &str) -> bool {
        MemoryTier::has(self, key)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(MemoryTier::delete(self, key))
    }

    async fn clear(&self) -> Result<()> {
        MemoryTier::clear(self);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(MemoryTier::keys(self))
    }

    async fn entries(&self) -> Result<Vec<CacheEntry<T>>> {
        Ok(MemoryTier::entries(self))
    }

    async fn stats(&self) -> CacheStats {
        MemoryTier::stats(self)
    }

    async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        Ok(MemoryTier::purge_expired(self))
    }
}

#[async_trait]
impl<T: CacheValue> CacheTier<T> for WarmTier<T> {
    fn level(&self) -> TierLevel {
        TierLevel::Warm
    }

    async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.get_entry(key).await
    }

    async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        WarmTier::peek_entry(self, key).await
    }

    async fn set(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()> {
        WarmTier::set(self, key, value, ttl).await.map(|_| ())
    }

    async fn insert_entry(&self, entry: CacheEntry<T>) -> Result<()> {
        WarmTier::insert_entry(self, entry).await.map(|_| ())
    }

    async fn has(&self, key: &str) -> bool {
        WarmTier::has(self, key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        WarmTier::delete(self, key).await
    }

    async fn clear(&self) -> Result<()> {
        WarmTier::clear(self).await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        WarmTier::keys(self).await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry<T>>> {
        WarmTier::entries(self).await
    }

    async fn stats(&self) -> CacheStats {
        WarmTier::stats(self).await
    }

    async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        WarmTier::purge_expired(self).await
    }
}

#[async_trait]
impl<T: CacheValue> CacheTier<T> for ColdTier<T> {
    fn level(&self) -> TierLevel {
        TierLevel::Cold
    }

    async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.get_entry(key).await
    }

    async fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        ColdTier::peek_entry(self, key).await
    }

    async fn set(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()> {
        ColdTier::set(self, key, value, ttl).await.map(|_| ())
    }

    async fn insert_entry(&self, entry: CacheEntry<T>) -> Result<()> {
        ColdTier::insert_entry(self, entry).await.map(|_| ())
    }

    async fn has(&self, key: &str) -> bool {
        ColdTier::has(self, key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        ColdTier::delete(self, key).await
    }

    async fn clear(&self) -> Result<()> {
        ColdTier::clear(self).await
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        ColdTier::keys(self).await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry<T>>> {
        ColdTier::entries(self).await
    }

    async fn stats(&self) -> CacheStats {
        ColdTier::stats(self).await
    }

    async fn purge_expired(&self) -> Result<Vec<InvalidationEvent>> {
        ColdTier::purge_expired(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::{ColdTierConfig, DiskTierConfig, MemoryTierConfig};
    use tempfile::TempDir;

    async fn exercise(tier: &dyn CacheTier<String>) {
        tier.set("k1".to_string(), "v1".to_string(), None).await.unwrap();
        assert!(tier.has("k1").await);
        assert_eq!(tier.get("k1").await.unwrap().value, "v1");
        assert_eq!(tier.keys().await.unwrap(), vec!["k1".to_string()]);

        assert!(tier.delete("k1").await.unwrap());
        assert!(!tier.has("k1").await);

        tier.set("k2".to_string(), "v2".to_string(), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = tier.purge_expired().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tier, tier.level());
        assert!(tier.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_tier_honors_the_contract() {
        let tmp = TempDir::new().unwrap();

        let memory = MemoryTier::<String>::new(MemoryTierConfig::default());
        let warm = WarmTier::<String>::open(DiskTierConfig::warm(tmp.path().join("l2")))
            .await
            .unwrap();
        let cold = ColdTier::<String>::open(ColdTierConfig::archive(tmp.path().join("l3")))
            .await
            .unwrap();

        let tiers: Vec<&dyn CacheTier<String>> = vec![&memory, &warm, &cold];
        for tier in tiers {
            exercise(tier).await;
        }
    }

    #[test]
    fn test_memory_tier_needs_no_runtime() {
        let memory = MemoryTier::<String>::new(MemoryTierConfig::default());
        let tier: &dyn CacheTier<String> = &memory;

        tokio_test::block_on(async {
            tier.set("k1".to_string(), "v1".to_string(), None).await.unwrap();
            assert_eq!(tier.level(), TierLevel::Hot);
            assert_eq!(tier.stats().await.sets, 1);
            tier.clear().await.unwrap();
            assert!(tier.keys().await.unwrap().is_empty());
        });
    }

    #[tokio::test]
    async fn test_insert_entry_keeps_timestamps() {
        let tmp = TempDir::new().unwrap();
        let warm = WarmTier::<String>::open(DiskTierConfig::warm(tmp.path()))
            .await
            .unwrap();

        let entry = CacheEntry::new("k1", "v".to_string(), Duration::from_secs(60));
        let created_at = entry.created_at;
        CacheTier::insert_entry(&warm, entry).await.unwrap();

        let stored = CacheTier::peek_entry(&warm, "k1").await.unwrap();
        assert_eq!(stored.created_at, created_at);
        assert_eq!(stored.ttl, 60_000);
    }
}
