//! Deterministic key derivation for natural-language queries
//!
//! A query is normalized into a sorted token string, hashed with SHA-256 and
//! folded into a key of the form `{agent}_{queryType}_{hash16}`. Because the
//! tokens are sorted, queries that differ only in word order or stop words
//! share a key.

use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Hex characters of the query digest kept in a key
pub const KEY_HASH_LEN: usize = 16;

/// Hex characters of the shard name (4096 shards)
pub const BUCKET_LEN: usize = 3;

/// Tokens shorter than this are dropped during normalization
pub const MIN_TOKEN_LEN: usize = 3;

const CODE_PLACEHOLDER: &str = " tokcode ";
const URL_PLACEHOLDER: &str = " tokurl ";
const PATH_PLACEHOLDER: &str = " tokpath ";
const NUMBER_PLACEHOLDER: &str = " toknum ";

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*?```|`[^`\n]*`").expect("valid code span regex"));

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:https?|ftp)://\S+|www\.\S+").expect("valid url regex"));

static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:~|\.{1,2})?/?[\w.-]+(?:/[\w.-]+)+/?").expect("valid path regex")
});

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\b").expect("valid number regex"));

static PUNCTUATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]|_").expect("valid punctuation regex"));

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let agents = AgentId::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>().join("|");
    let types = QueryType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"^({agents})_({types})_([0-9a-f]{{{KEY_HASH_LEN}}})$"))
        .expect("valid key regex")
});

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
        "was", "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "who",
        "did", "get", "got", "let", "she", "too", "use", "way", "also", "been", "from", "into",
        "just", "like", "more", "most", "much", "must", "only", "over", "some", "such", "than",
        "that", "them", "then", "there", "these", "they", "this", "those", "very", "what",
        "when", "where", "which", "while", "will", "with", "would", "your", "about", "after",
        "again", "against", "before", "being", "below", "between", "both", "could", "does",
        "doing", "down", "during", "each", "few", "further", "here", "hers", "himself",
        "itself", "myself", "once", "other", "ours", "same", "should", "their", "theirs",
        "themselves", "through", "under", "until", "were", "why", "yours", "above", "because",
        "off", "own", "nor", "whom",
    ]
    .into_iter()
    .collect()
});

/// Originating agent of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "TAN")]
    Tan,
    #[serde(rename = "ZEN")]
    Zen,
    #[serde(rename = "INO")]
    Ino,
    #[serde(rename = "JUNO")]
    Juno,
    #[serde(rename = "AJ")]
    Aj,
}

impl AgentId {
    pub const ALL: [AgentId; 5] = [
        AgentId::Tan,
        AgentId::Zen,
        AgentId::Ino,
        AgentId::Juno,
        AgentId::Aj,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Tan => "TAN",
            AgentId::Zen => "ZEN",
            AgentId::Ino => "INO",
            AgentId::Juno => "JUNO",
            AgentId::Aj => "AJ",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        AgentId::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKey(format!("unknown agent: {}", s)))
    }
}

/// Category of a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Analysis,
    Pattern,
    Research,
    Validation,
    /// Reserved for keys derived from an investigation identifier
    Investigation,
}

impl QueryType {
    pub const ALL: [QueryType; 5] = [
        QueryType::Analysis,
        QueryType::Pattern,
        QueryType::Research,
        QueryType::Validation,
        QueryType::Investigation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Analysis => "analysis",
            QueryType::Pattern => "pattern",
            QueryType::Research => "research",
            QueryType::Validation => "validation",
            QueryType::Investigation => "investigation",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        QueryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CacheError::InvalidKey(format!("unknown query type: {}", s)))
    }
}

/// A generated key split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub agent: AgentId,
    pub query_type: QueryType,
    pub hash: String,
}

impl ParsedKey {
    /// Rebuild the canonical key string
    pub fn to_key(&self) -> CacheKey {
        format!("{}_{}_{}", self.agent, self.query_type, self.hash)
    }
}

/// Derives cache keys and shard names from free-text queries
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a query into its sorted, space-joined token string
    pub fn normalize(&self, query: &str) -> String {
        self.tokens(query).join(" ")
    }

    /// Normalized tokens in sorted order (duplicates kept)
    pub fn tokens(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let text = CODE_PATTERN.replace_all(&lowered, CODE_PLACEHOLDER);
        let text = URL_PATTERN.replace_all(&text, URL_PLACEHOLDER);
        let text = PATH_PATTERN.replace_all(&text, PATH_PLACEHOLDER);
        let text = NUMBER_PATTERN.replace_all(&text, NUMBER_PLACEHOLDER);
        let text = PUNCTUATION_PATTERN.replace_all(&text, " ");

        let mut tokens: Vec<String> = text
            .split_whitespace()
            // keep internal hyphens only
            .map(|t| t.trim_matches('-'))
            .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
            .filter(|t| !STOP_WORDS.contains(*t))
            .map(str::to_string)
            .collect();

        tokens.sort();
        tokens
    }

    /// Full lowercase SHA-256 hex digest
    pub fn hash(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// `{agent}_{queryType}_{hash16}` for a free-text query
    pub fn generate_key(&self, query: &str, agent: AgentId, query_type: QueryType) -> CacheKey {
        let digest = self.hash(&self.normalize(query));
        format!("{}_{}_{}", agent, query_type, &digest[..KEY_HASH_LEN])
    }

    /// Key for an investigation identifier; the identifier is hashed verbatim
    pub fn investigation_key(&self, agent: AgentId, investigation_id: &str) -> CacheKey {
        self.identifier_key(agent, QueryType::Investigation, investigation_id)
    }

    /// Key for a pattern identifier; the identifier is hashed verbatim
    pub fn pattern_key(&self, agent: AgentId, pattern_id: &str) -> CacheKey {
        self.identifier_key(agent, QueryType::Pattern, pattern_id)
    }

    fn identifier_key(&self, agent: AgentId, query_type: QueryType, id: &str) -> CacheKey {
        let digest = self.hash(id);
        format!("{}_{}_{}", agent, query_type, &digest[..KEY_HASH_LEN])
    }

    /// Shard directory for a key: first 3 hex chars of SHA-256 over the key itself
    pub fn bucket_of(&self, key: &str) -> String {
        let digest = self.hash(key);
        digest[..BUCKET_LEN].to_string()
    }

    /// Whether a key matches the generated-key format
    pub fn is_valid_key(&self, key: &str) -> bool {
        KEY_PATTERN.is_match(key)
    }

    /// Split a generated key into agent, query type and hash
    pub fn parse_key(&self, key: &str) -> Option<ParsedKey> {
        let caps = KEY_PATTERN.captures(key)?;
        Some(ParsedKey {
            agent: caps.get(1)?.as_str().parse().ok()?,
            query_type: caps.get(2)?.as_str().parse().ok()?,
            hash: caps.get(3)?.as_str().to_string(),
        })
    }
}

/// Whether a key can be used verbatim as a file name inside a shard directory
pub fn is_file_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 200
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}
