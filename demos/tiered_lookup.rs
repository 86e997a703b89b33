//! Tiered Lookup Demo
//!
//! Stores a few analysis results, then walks a lookup through each tier:
//! a hot hit, a warm hit after the hot tier is dropped, a cold hit after the
//! warm tier is cleared, and a similarity fallback.
//!
//! Usage:
//!   cargo run --example tiered_lookup
//!
//! Environment variables:
//!   OUROBOROS_CACHE_ROOT - cache directory (default: a fresh temp directory)
//!   RUST_LOG             - log filter (default: info)

use ouroboros_cache::{AgentId, CacheConfig, QueryType, TieredCache};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Report {
    title: String,
    findings: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Tiered Cache Demo ===");

    let root: std::path::PathBuf = match std::env::var("OUROBOROS_CACHE_ROOT") {
        Ok(root) => root.into(),
        Err(_) => std::env::temp_dir().join(format!("ouroboros-cache-demo-{}", uuid::Uuid::new_v4())),
    };
    info!("Cache root: {:?}", root);

    let cache: TieredCache<Report> = TieredCache::open(CacheConfig::with_root(&root)).await?;

    let query = "why does the payment worker retry forever";
    let key = cache
        .store(
            query,
            AgentId::Tan,
            QueryType::Analysis,
            Report {
                title: "Retry storm".to_string(),
                findings: vec!["no backoff cap".to_string(), "idempotency key missing".to_string()],
            },
        )
        .await?;
    info!("Stored under {}", key);

    info!("\n--- Hot hit ---");
    if let Some(hit) = cache.lookup("payment worker retry forever why", AgentId::Tan, QueryType::Analysis).await {
        info!("✓ {:?}: {}", hit.source, hit.value.title);
    }

    info!("\n--- Warm hit (hot tier dropped) ---");
    cache.memory().clear();
    if let Some(hit) = cache.get_by_key(&key).await {
        info!("✓ {:?}: {}", hit.source, hit.value.title);
    }

    info!("\n--- Cold hit (hot and warm dropped) ---");
    cache.memory().clear();
    cache.warm().clear().await?;
    if let Some(hit) = cache.get_by_key(&key).await {
        info!("✓ {:?}: {}", hit.source, hit.value.title);
    }

    info!("\n--- Similarity fallback ---");
    match cache
        .lookup(
            "why does the payment worker retry forever after timeout",
            AgentId::Tan,
            QueryType::Analysis,
        )
        .await
    {
        Some(hit) => info!("✓ {:?}: {}", hit.source, hit.value.title),
        None => info!("✗ no similar entry"),
    }

    cache.flush_refreshes().await;
    info!("\n--- Statistics ---\n{}", cache.stats().await);

    Ok(())
}
