//! Similarity Matching Demo
//!
//! Scores a query against a handful of cached queries with every metric and
//! groups them with both clustering modes.
//!
//! Usage:
//!   cargo run --example similarity_demo

use ouroboros_cache::{KeyGenerator, SimilarityMatcher};
use tracing::{info, Level};

const CACHED: [&str; 6] = [
    "review the auth flow for token leaks",
    "auth flow review token leaks",
    "token refresh leaks in auth review",
    "slow queries on the orders table",
    "orders table queries are slow",
    "css grid layout breaks on mobile",
];

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let keys = KeyGenerator::new();
    let matcher = SimilarityMatcher::new();
    let query = "token leaks in the auth flow";

    info!("Query: {:?}", query);
    info!("Normalized: {:?}", keys.normalize(query));

    info!("\n--- Scores ---");
    for candidate in CACHED {
        info!(
            "jaccard {:.2}  cosine {:.2}  edit {:.2}  hybrid {:.2}  {:?}",
            matcher.jaccard(query, candidate),
            matcher.cosine(query, candidate),
            matcher.edit_similarity(query, candidate),
            matcher.hybrid(query, candidate),
            candidate
        );
    }

    info!("\n--- Matches at 0.6 ---");
    for found in matcher.find_similar_queries(query, &CACHED, 0.6) {
        info!("{:.2} {:?}", found.score, found.query);
    }

    info!("\n--- Clusters at 0.5 ---");
    for cluster in matcher.find_clusters(&CACHED, 0.5) {
        let members: Vec<&str> = cluster.iter().map(|&i| CACHED[i]).collect();
        info!("seeded:     {:?}", members);
    }
    for cluster in matcher.find_clusters_transitive(&CACHED, 0.5) {
        let members: Vec<&str> = cluster.iter().map(|&i| CACHED[i]).collect();
        info!("transitive: {:?}", members);
    }
}
