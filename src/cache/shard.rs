//! One partition of the cache keyspace. Each shard is a `moka::sync::Cache`
//! (the L1 in-process cache tier) configured with a per-entry
//! [`Expiry`] so a key set with no TTL (e.g. under the `STATIC` policy)
//! never expires, while one set with a TTL is evicted exactly on schedule —
//! `CacheEngine` hands every `set` its own TTL, so a cache-wide
//! `time_to_live` builder setting isn't expressive enough on its own.
//!
//! Sharding itself (hashing a key to one of N caches) stays hand-rolled in
//! `cache::mod` rather than relying on moka's own internal segmentation:
//! the engine needs shard identity to reason about "a write holds only its
//! shard" (§5), which moka's segmented concurrent map doesn't expose.

use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use serde_json::Value;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Option<Duration>,
}

struct TtlExpiry;

impl Expiry<String, Entry> for TtlExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }
}

pub struct Shard {
    cache: Cache<String, Entry>,
}

impl Shard {
    pub fn new() -> Self {
        let cache = Cache::builder().expire_after(TtlExpiry).build();
        Self { cache }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(key).map(|entry| entry.value)
    }

    pub fn set(&self, key: String, value: Value, ttl: Option<Duration>) {
        self.cache.insert(key, Entry { value, ttl });
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let existing = self.cache.get(key).map(|entry| entry.value);
        self.cache.invalidate(key);
        existing
    }

    pub fn len(&self) -> usize {
        self.cache.run_pending_tasks();
        self.cache.entry_count() as usize
    }
}
