//! Fuzzy matching between queries
//!
//! The primary score is Jaccard similarity over the token sets produced by
//! [`KeyGenerator::tokens`]. Cosine similarity over term frequencies and
//! normalized Levenshtein similarity are available for weighted ranking, and
//! [`SimilarityMatcher::hybrid`] blends all three.

use crate::cache::key::KeyGenerator;
use std::collections::{HashMap, HashSet};

/// Default score a candidate must reach to count as similar
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

const JACCARD_WEIGHT: f64 = 0.5;
const COSINE_WEIGHT: f64 = 0.3;
const EDIT_WEIGHT: f64 = 0.2;

/// A candidate that met the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarQuery {
    /// Position in the candidate slice
    pub index: usize,
    pub query: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    keys: KeyGenerator,
    threshold: f64,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityMatcher {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            keys: KeyGenerator::new(),
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn token_set(&self, query: &str) -> HashSet<String> {
        self.keys.tokens(query).into_iter().collect()
    }

    /// Primary score, identical to [`Self::jaccard`]
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.jaccard(a, b)
    }

    /// |A ∩ B| / |A ∪ B| over normalized token sets
    pub fn jaccard(&self, a: &str, b: &str) -> f64 {
        jaccard_sets(&self.token_set(a), &self.token_set(b))
    }

    /// Cosine similarity of term-frequency vectors
    pub fn cosine(&self, a: &str, b: &str) -> f64 {
        let tf_a = term_frequencies(self.keys.tokens(a));
        let tf_b = term_frequencies(self.keys.tokens(b));

        match (tf_a.is_empty(), tf_b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }

        let dot: f64 = tf_a
            .iter()
            .filter_map(|(term, &count)| tf_b.get(term).map(|&other| (count * other) as f64))
            .sum();
        let norm = |tf: &HashMap<String, usize>| {
            tf.values().map(|&c| (c * c) as f64).sum::<f64>().sqrt()
        };

        (dot / (norm(&tf_a) * norm(&tf_b))).clamp(0.0, 1.0)
    }

    /// `1 - levenshtein / max_len` over the lowercased raw strings
    pub fn edit_similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.to_lowercase().chars().collect();
        let b: Vec<char> = b.to_lowercase().chars().collect();

        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / max_len as f64
    }

    /// 50% Jaccard + 30% cosine + 20% edit similarity
    pub fn hybrid(&self, a: &str, b: &str) -> f64 {
        JACCARD_WEIGHT * self.jaccard(a, b)
            + COSINE_WEIGHT * self.cosine(a, b)
            + EDIT_WEIGHT * self.edit_similarity(a, b)
    }

    pub fn are_similar(&self, a: &str, b: &str) -> bool {
        self.similarity(a, b) >= self.threshold
    }

    /// Candidates scoring at or above `threshold`, best first.
    /// Equal scores keep their input order.
    pub fn find_similar_queries<S: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[S],
        threshold: f64,
    ) -> Vec<SimilarQuery> {
        let target = self.token_set(query);

        let mut matches: Vec<SimilarQuery> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                let candidate = candidate.as_ref();
                let score = jaccard_sets(&target, &self.token_set(candidate));
                (score >= threshold).then(|| SimilarQuery {
                    index,
                    query: candidate.to_string(),
                    score,
                })
            })
            .collect();

        // sort_by is stable
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches
    }

    /// Highest-scoring candidate at or above `threshold`
    pub fn find_best_match<S: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[S],
        threshold: f64,
    ) -> Option<SimilarQuery> {
        self.find_similar_queries(query, candidates, threshold)
            .into_iter()
            .next()
    }

    /// Seed-based single-link grouping.
    ///
    /// Each unassigned query seeds a cluster and pulls in every later
    /// unassigned query similar to the seed. Order-dependent: a query similar
    /// only to a non-seed member starts its own cluster. Singletons are kept,
    /// so every input index appears exactly once.
    pub fn find_clusters<S: AsRef<str>>(&self, queries: &[S], threshold: f64) -> Vec<Vec<usize>> {
        let sets: Vec<HashSet<String>> = queries.iter().map(|q| self.token_set(q.as_ref())).collect();
        let mut assigned = vec![false; sets.len()];
        let mut clusters = Vec::new();

        for seed in 0..sets.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut cluster = vec![seed];

            for other in (seed + 1)..sets.len() {
                if !assigned[other] && jaccard_sets(&sets[seed], &sets[other]) >= threshold {
                    assigned[other] = true;
                    cluster.push(other);
                }
            }
            clusters.push(cluster);
        }

        clusters
    }

    /// Transitive closure of the "similar" relation via union-find.
    /// Clusters are ordered by their smallest index.
    pub fn find_clusters_transitive<S: AsRef<str>>(
        &self,
        queries: &[S],
        threshold: f64,
    ) -> Vec<Vec<usize>> {
        let sets: Vec<HashSet<String>> = queries.iter().map(|q| self.token_set(q.as_ref())).collect();
        let mut forest = DisjointSet::new(sets.len());

        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                if jaccard_sets(&sets[i], &sets[j]) >= threshold {
                    forest.union(i, j);
                }
            }
        }

        let mut order: Vec<usize> = Vec::new();
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..sets.len() {
            let root = forest.find(i);
            groups
                .entry(root)
                .or_insert_with(|| {
                    order.push(root);
                    Vec::new()
                })
                .push(i);
        }

        order
            .into_iter()
            .filter_map(|root| groups.remove(&root))
            .collect()
    }
}

fn jaccard_sets(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => {
            let intersection = a.intersection(b).count();
            let union = a.len() + b.len() - intersection;
            intersection as f64 / union as f64
        }
    }
}

fn term_frequencies(tokens: Vec<String>) -> HashMap<String, usize> {
    let mut tf = HashMap::new();
    for token in tokens {
        *tf.entry(token).or_insert(0) += 1;
    }
    tf
}

/// Two-row Levenshtein distance
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
