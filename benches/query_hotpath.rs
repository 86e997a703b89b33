use criterion::{criterion_group, criterion_main, Criterion};
use ouroboros_cache::cache::{
    AgentId, DiskTierConfig, KeyGenerator, MemoryTier, MemoryTierConfig, QueryType,
    SimilarityMatcher, WarmTier,
};
use std::hint::black_box;

const QUERY: &str = "Why does `retry_loop()` in src/payments/worker.rs spin 10000 times \
                     when https://api.example.com returns a 503 for the payment worker?";

fn candidates() -> Vec<String> {
    (0..200)
        .map(|i| format!("payment worker retry analysis variant {} backoff jitter {}", i % 17, i % 5))
        .collect()
}

fn bench_key_generation(c: &mut Criterion) {
    let keys = KeyGenerator::new();

    c.bench_function("key/normalize", |b| {
        b.iter(|| black_box(keys.normalize(black_box(QUERY))));
    });

    c.bench_function("key/generate", |b| {
        b.iter(|| black_box(keys.generate_key(black_box(QUERY), AgentId::Tan, QueryType::Analysis)));
    });
}

fn bench_similarity(c: &mut Criterion) {
    let matcher = SimilarityMatcher::new();
    let pool = candidates();

    c.bench_function("similarity/hybrid", |b| {
        b.iter(|| black_box(matcher.hybrid(black_box(QUERY), black_box(&pool[3]))));
    });

    c.bench_function("similarity/find_best_match_200", |b| {
        b.iter(|| black_box(matcher.find_best_match(black_box(QUERY), &pool, 0.3)));
    });

    c.bench_function("similarity/clusters_200", |b| {
        b.iter(|| black_box(matcher.find_clusters(&pool, 0.6)));
    });
}

fn bench_memory_tier(c: &mut Criterion) {
    let hot: MemoryTier<String> = MemoryTier::new(MemoryTierConfig::default());
    for i in 0..1000 {
        hot.set(format!("key_{}", i), format!("value_{}", i), None)
            .expect("set hot entry");
    }

    c.bench_function("hot/get_hit", |b| {
        b.iter(|| black_box(hot.get(black_box("key_500"))));
    });

    c.bench_function("hot/set_with_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            hot.set(format!("churn_{}", i % 2000), "v".to_string(), None)
                .expect("set hot entry");
        });
    });
}

fn bench_warm_tier(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("build runtime");
    let dir = tempfile::tempdir().expect("create temp dir");
    let warm: WarmTier<String> = rt
        .block_on(WarmTier::open(DiskTierConfig::warm(dir.path())))
        .expect("open warm tier");
    rt.block_on(warm.set("bench-key", "payload".repeat(64), None))
        .expect("set warm entry");

    c.bench_function("warm/get_hit", |b| {
        b.to_async(&rt).iter(|| async { black_box(warm.get("bench-key").await) });
    });
}

criterion_group!(
    benches,
    bench_key_generation,
    bench_similarity,
    bench_memory_tier,
    bench_warm_tier
);
criterion_main!(benches);
