//! Invalidation reasons and events
//!
//! Expiry sweeps and agent purges report what they removed as
//! `InvalidationEvent`s so callers can log or audit what left the cache.

use crate::cache::key::AgentId;
use crate::cache::types::TierLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason for cache invalidation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// Entry expired based on TTL
    Expired,

    /// Every key of one originating agent removed
    AgentPurge { agent: AgentId },
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidationReason::Expired => write!(f, "TTL expired"),
            InvalidationReason::AgentPurge { agent } => write!(f, "agent purge: {}", agent),
        }
    }
}

/// Event for cache invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Reason for invalidation
    pub reason: InvalidationReason,

    /// Tier the keys were removed from
    pub tier: TierLevel,

    /// When the invalidation occurred
    pub timestamp: DateTime<Utc>,

    /// Keys that were invalidated
    pub keys: Vec<String>,

    /// Additional context
    pub context: Option<String>,
}

impl InvalidationEvent {
    /// Create a new invalidation event
    pub fn new(reason: InvalidationReason, tier: TierLevel, keys: Vec<String>) -> Self {
        Self {
            reason,
            tier,
            timestamp: Utc::now(),
            keys,
            context: None,
        }
    }

    /// Add context to the event
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidation_reason_display() {
        assert_eq!(InvalidationReason::Expired.to_string(), "TTL expired");

        let reason = InvalidationReason::AgentPurge { agent: AgentId::Zen };
        assert_eq!(reason.to_string(), "agent purge: ZEN");
    }

    #[test]
    fn test_invalidation_event() {
        let event = InvalidationEvent::new(
            InvalidationReason::Expired,
            TierLevel::Warm,
            vec!["key1".to_string(), "key2".to_string()],
        )
        .with_context("test context");

        assert_eq!(event.len(), 2);
        assert_eq!(event.context, Some("test context".to_string()));
        assert_eq!(event.tier, TierLevel::Warm);
        assert_eq!(event.reason, InvalidationReason::Expired);
    }
}
