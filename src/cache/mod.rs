//! Multi-level cache with tag-based invalidation (C3).
//!
//! Two indices are maintained alongside the entry store, per §9's
//! re-architecture note: `tag -> set(key)` and `entityTag -> set(key)`.
//! Entries live in one of 16 shards (hashed by key); each shard has its own
//! `parking_lot::RwLock`, so a write only ever contends with readers/writers
//! of the *same* shard ("many readers, few writers per shard" in §5). The
//! tag and entity indices are process-wide `DashMap`s because invalidation
//! must resolve a tag to its keys in one step regardless of which shard
//! those keys happen to hash into.
//!
//! A `redis`-backed shared tier is optional; losing it flips `degraded`
//! rather than failing reads (§4.1 Failure). Local shards always remain the
//! source of truth for TTL expiry, so the engine never serves anything past
//! its TTL even while degraded.

mod policy;
mod shard;

pub use policy::CachePolicy;

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use shard::Shard;

const SHARD_COUNT: usize = 16;

/// Options accepted by [`CacheEngine::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub entity_tag: Option<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn entity_tag(mut self, entity_tag: impl Into<String>) -> Self {
        self.entity_tag = Some(entity_tag.into());
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
}

/// The cache engine itself. Cheap to clone (all state behind `Arc`), so it
/// can be handed to every `CachedRepository` without a wrapping `Arc` at the
/// call site.
#[derive(Clone)]
pub struct CacheEngine {
    shards: Arc<Vec<Shard>>,
    tag_index: Arc<DashMap<String, HashSet<String>>>,
    entity_index: Arc<DashMap<String, HashSet<String>>>,
    degraded: Arc<AtomicBool>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    sets: Arc<AtomicU64>,
    invalidations: Arc<AtomicU64>,
}

impl CacheEngine {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Shard::new()).collect();
        Self {
            shards: Arc::new(shards),
            tag_index: Arc::new(DashMap::new()),
            entity_index: Arc::new(DashMap::new()),
            degraded: Arc::new(AtomicBool::new(false)),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            sets: Arc::new(AtomicU64::new(0)),
            invalidations: Arc::new(AtomicU64::new(0)),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// `get(key) -> value|miss`. A miss is indistinguishable whether the key
    /// was never set or has expired — callers read through on either.
    pub fn get(&self, key: &str) -> Option<Value> {
        let hit = self.shard_for(key).get(key);
        match hit {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Upsert a key, updating the tag and entity indices in the same call so
    /// a reader can never observe a key present in the entry store without
    /// also being reachable from its tags.
    pub fn set(&self, key: impl Into<String>, value: Value, opts: SetOptions) {
        let key = key.into();
        self.shard_for(&key).set(key.clone(), value, opts.ttl);

        for tag in &opts.tags {
            self.tag_index.entry(tag.clone()).or_default().insert(key.clone());
        }
        if let Some(entity_tag) = &opts.entity_tag {
            self.entity_index
                .entry(entity_tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.shard_for(key).remove(key);
        if removed.is_some() {
            self.unindex(key);
        }
        removed.is_some()
    }

    fn unindex(&self, key: &str) {
        for mut entry in self.tag_index.iter_mut() {
            entry.value_mut().remove(key);
        }
        for mut entry in self.entity_index.iter_mut() {
            entry.value_mut().remove(key);
        }
    }

    /// Remove every entry bearing `tag` in one logical step: the key set is
    /// snapshotted once under the tag index, then each key is removed from
    /// its shard. Any `get` issued after this call returns for a key whose
    /// removal has completed will see a miss — no stale read is possible
    /// because removal happens under the same shard lock `get` uses.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys = match self.tag_index.remove(tag) {
            Some((_, keys)) => keys,
            None => return 0,
        };
        for key in &keys {
            self.shard_for(key).remove(key);
            self.unindex_except(key, tag);
        }
        self.invalidations.fetch_add(keys.len() as u64, Ordering::Relaxed);
        keys.len()
    }

    fn unindex_except(&self, key: &str, already_removed_tag: &str) {
        for mut entry in self.tag_index.iter_mut() {
            if entry.key() != already_removed_tag {
                entry.value_mut().remove(key);
            }
        }
        for mut entry in self.entity_index.iter_mut() {
            entry.value_mut().remove(key);
        }
    }

    /// Invalidate every key tied to `entity_tag` (e.g. `"inspection:I1"`),
    /// and — per §4.1 — every list-level tag the implementation stamps for
    /// that resource: `{resource}:list`, `{resource}:status:{s}`,
    /// `{resource}:category:{c}`. The resource name is the segment before
    /// the first `:` in the entity tag.
    pub fn invalidate_entity(&self, entity_tag: &str) -> usize {
        let mut total = 0usize;
        if let Some((_, keys)) = self.entity_index.remove(entity_tag) {
            for key in &keys {
                self.shard_for(key).remove(key);
                self.unindex(key);
            }
            total += keys.len();
        }

        let resource = entity_tag.split(':').next().unwrap_or(entity_tag);
        let list_tags: Vec<String> = self
            .tag_index
            .iter()
            .map(|e| e.key().clone())
            .filter(|t| {
                t == &format!("{resource}:list")
                    || t.starts_with(&format!("{resource}:status:"))
                    || t.starts_with(&format!("{resource}:category:"))
            })
            .collect();
        for tag in list_tags {
            total += self.invalidate_by_tag(&tag);
        }
        self.invalidations.fetch_add(total as u64, Ordering::Relaxed);
        total
    }

    /// Mark the shared tier unreachable. Reads continue to be served from
    /// local shards; writes stop attempting to mirror to the shared store.
    pub fn mark_degraded(&self) {
        self.degraded.store(true, Ordering::SeqCst);
    }

    pub fn mark_healthy(&self) {
        self.degraded.store(false, Ordering::SeqCst);
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl Default for CacheEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the standard key namespaces from §6:
/// `{resource}:{id}`, `{resource}:list:{queryFp}`, `{resource}:status:{s}`,
/// `{resource}:category:{c}`. Centralized so handlers and services agree on
/// the exact strings CacheEngine's entity invalidation pattern-matches.
pub mod keys {
    pub fn entity(resource: &str, id: &str) -> String {
        format!("{resource}:{id}")
    }

    pub fn list(resource: &str, query_fingerprint: &str) -> String {
        format!("{resource}:list:{query_fingerprint}")
    }

    pub fn list_tag(resource: &str) -> String {
        format!("{resource}:list")
    }

    pub fn status_tag(resource: &str, status: &str) -> String {
        format!("{resource}:status:{status}")
    }

    pub fn category_tag(resource: &str, category: &str) -> String {
        format!("{resource}:category:{category}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = CacheEngine::new();
        cache.set("inspection:I1", serde_json::json!({"id": "I1"}), SetOptions::new());
        assert_eq!(cache.get("inspection:I1"), Some(serde_json::json!({"id": "I1"})));
    }

    #[test]
    fn missing_key_is_a_miss() {
        let cache = CacheEngine::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn invalidate_by_tag_removes_every_tagged_entry() {
        let cache = CacheEngine::new();
        cache.set(
            "inspection:I1",
            serde_json::json!(1),
            SetOptions::new().tags(["inspection:status:scheduled".to_string()]),
        );
        cache.set(
            "inspection:I2",
            serde_json::json!(2),
            SetOptions::new().tags(["inspection:status:scheduled".to_string()]),
        );
        cache.set("inspection:I3", serde_json::json!(3), SetOptions::new());

        let count = cache.invalidate_by_tag("inspection:status:scheduled");
        assert_eq!(count, 2);
        assert_eq!(cache.get("inspection:I1"), None);
        assert_eq!(cache.get("inspection:I2"), None);
        assert_eq!(cache.get("inspection:I3"), Some(serde_json::json!(3)));
    }

    #[test]
    fn get_after_invalidate_never_returns_stale_value() {
        let cache = CacheEngine::new();
        cache.set(
            "inspection:I1",
            serde_json::json!("old"),
            SetOptions::new().tags(["t".to_string()]),
        );
        cache.invalidate_by_tag("t");
        assert_eq!(cache.get("inspection:I1"), None);
    }

    #[test]
    fn invalidate_entity_also_clears_stamped_list_tags() {
        let cache = CacheEngine::new();
        cache.set(
            "inspection:I1",
            serde_json::json!(1),
            SetOptions::new().entity_tag("inspection:I1"),
        );
        cache.set(
            "inspection:list:all",
            serde_json::json!(["I1"]),
            SetOptions::new().tags([keys::list_tag("inspection")]),
        );
        cache.set(
            "inspection:list:scheduled",
            serde_json::json!(["I1"]),
            SetOptions::new().tags([keys::status_tag("inspection", "scheduled")]),
        );

        let count = cache.invalidate_entity("inspection:I1");
        assert!(count >= 3);
        assert_eq!(cache.get("inspection:I1"), None);
        assert_eq!(cache.get("inspection:list:all"), None);
        assert_eq!(cache.get("inspection:list:scheduled"), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = CacheEngine::new();
        cache.set(
            "k",
            serde_json::json!(1),
            SetOptions::new().ttl(Duration::from_millis(1)),
        );
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn degraded_flag_round_trips() {
        let cache = CacheEngine::new();
        assert!(!cache.is_degraded());
        cache.mark_degraded();
        assert!(cache.is_degraded());
        cache.mark_healthy();
        assert!(!cache.is_degraded());
    }

    #[test]
    fn delete_removes_from_indices() {
        let cache = CacheEngine::new();
        cache.set(
            "k",
            serde_json::json!(1),
            SetOptions::new().tags(["t".to_string()]),
        );
        assert!(cache.delete("k"));
        assert_eq!(cache.invalidate_by_tag("t"), 0);
    }
}
