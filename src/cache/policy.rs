//! Named cache policies (§4.1): `ENTITY` read-through single-id lookups,
//! `DYNAMIC` short-lived query results, `STATIC` long-lived manually
//! invalidated data.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Single-entity lookups by id: 5 minute TTL, read-through.
    Entity,
    /// Query-shaped results keyed by a fingerprint of the query: short TTL.
    Dynamic,
    /// Long-lived, invalidated only by explicit `delete`/tag/entity calls.
    Static,
}

impl CachePolicy {
    pub fn default_ttl(self) -> Duration {
        match self {
            CachePolicy::Entity => Duration::from_secs(300),
            CachePolicy::Dynamic => Duration::from_secs(30),
            CachePolicy::Static => Duration::from_secs(24 * 3600),
        }
    }

    /// Whether expiry is the primary invalidation path for this policy.
    /// `Static` entries are expected to live until an explicit invalidation
    /// arrives; the long TTL above is a safety net, not the normal path.
    pub fn relies_on_manual_invalidation(self) -> bool {
        matches!(self, CachePolicy::Static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_policy_has_five_minute_ttl() {
        assert_eq!(CachePolicy::Entity.default_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn dynamic_policy_is_shorter_than_entity() {
        assert!(CachePolicy::Dynamic.default_ttl() < CachePolicy::Entity.default_ttl());
    }

    #[test]
    fn static_policy_relies_on_manual_invalidation() {
        assert!(CachePolicy::Static.relies_on_manual_invalidation());
        assert!(!CachePolicy::Entity.relies_on_manual_invalidation());
    }
}
