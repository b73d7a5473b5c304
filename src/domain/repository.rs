//! Generic repository abstraction + cache-backed decorator (§4.5, §4.6).
//!
//! `Repository<T>` is the persistence seam every `DomainService` depends on
//! through `dyn` dispatch, so services never know whether they're talking to
//! the in-memory store (tests, dev) or a `sqlx`-backed one. `CachedRepository`
//! wraps any `Repository<T>` and adds read-through caching plus entity-tag
//! invalidation on write, composing with [`crate::cache::CacheEngine`] rather
//! than duplicating its indexing logic (§9: "Repository + cache as one god
//! object" is split into exactly this two-layer shape).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{keys, CacheEngine, SetOptions};
use crate::error::{AppError, AppResult};

use super::aggregate::AggregateRoot;

/// Page of results plus the total matching count, for offset-based
/// pagination over list endpoints (§6).
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Persistence seam for one aggregate type. Implementations are responsible
/// for the optimistic-concurrency check described in `save`'s docs; callers
/// never read or write `version` directly.
#[async_trait]
pub trait Repository<T: AggregateRoot + Clone + Send + Sync>: Send + Sync {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<T>>;

    /// List all entities matching `predicate`, newest-first, paginated by
    /// `offset`/`limit`. The predicate runs against the full set before
    /// pagination so `total` reflects the filtered count, not the page size.
    async fn list(
        &self,
        predicate: &(dyn Fn(&T) -> bool + Send + Sync),
        offset: usize,
        limit: usize,
    ) -> AppResult<Page<T>>;

    /// Insert a brand-new aggregate. Errors with `conflict` if `id` already
    /// exists.
    async fn insert(&self, entity: T) -> AppResult<T>;

    /// Persist an update. Implementations must compare the stored version
    /// against `entity.version()` and return `AppError::conflict` if they
    /// differ (§5 — optimistic concurrency), then bump the stored version by
    /// one on success.
    async fn save(&self, entity: T) -> AppResult<T>;

    async fn delete(&self, id: &str) -> AppResult<bool>;
}

struct Stored<T> {
    entity: T,
    version: u64,
}

/// In-memory `Repository` implementation. The default backend for tests and
/// for `IN_MEMORY_BACKENDS=true` deployments (see `config.rs`); a `sqlx`-
/// backed implementation would satisfy the same trait.
pub struct InMemoryRepository<T> {
    rows: RwLock<HashMap<String, Stored<T>>>,
}

impl<T> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()) }
    }
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: AggregateRoot + Clone + Send + Sync + 'static,
{
    async fn find_by_id(&self, id: &str) -> AppResult<Option<T>> {
        Ok(self.rows.read().get(id).map(|stored| stored.entity.clone()))
    }

    async fn list(
        &self,
        predicate: &(dyn Fn(&T) -> bool + Send + Sync),
        offset: usize,
        limit: usize,
    ) -> AppResult<Page<T>> {
        let rows = self.rows.read();
        let mut matching: Vec<&T> = rows
            .values()
            .map(|stored| &stored.entity)
            .filter(|entity| predicate(entity))
            .collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(Page { items, total })
    }

    async fn insert(&self, entity: T) -> AppResult<T> {
        let mut rows = self.rows.write();
        if rows.contains_key(entity.id()) {
            return Err(AppError::conflict(format!("entity {} already exists", entity.id())));
        }
        rows.insert(entity.id().to_string(), Stored { entity: entity.clone(), version: 0 });
        Ok(entity)
    }

    async fn save(&self, mut entity: T) -> AppResult<T> {
        let mut rows = self.rows.write();
        let stored = rows
            .get(entity.id())
            .ok_or_else(|| AppError::not_found(format!("entity {} not found", entity.id())))?;
        if stored.version != entity.version() {
            return Err(AppError::conflict(format!(
                "entity {} was modified concurrently (expected version {}, found {})",
                entity.id(),
                entity.version(),
                stored.version
            )));
        }
        let next_version = stored.version + 1;
        rows.insert(entity.id().to_string(), Stored { entity: entity.clone(), version: next_version });
        entity.bump_version(next_version);
        Ok(entity)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.rows.write().remove(id).is_some())
    }
}

/// Decorates any `Repository<T>` with read-through caching and entity-tag
/// invalidation on write (§4.6). `resource` names the key namespace (e.g.
/// `"inspection"`) the way `cache::keys` expects.
pub struct CachedRepository<T, R> {
    inner: Arc<R>,
    cache: CacheEngine,
    resource: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<T, R> CachedRepository<T, R> {
    pub fn new(inner: Arc<R>, cache: CacheEngine, resource: &'static str) -> Self {
        Self { inner, cache, resource, _marker: std::marker::PhantomData }
    }
}

#[async_trait]
impl<T, R> Repository<T> for CachedRepository<T, R>
where
    T: AggregateRoot + Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
    R: Repository<T>,
{
    async fn find_by_id(&self, id: &str) -> AppResult<Option<T>> {
        let key = keys::entity(self.resource, id);
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(entity) = serde_json::from_value(cached) {
                return Ok(Some(entity));
            }
        }

        let found = self.inner.find_by_id(id).await?;
        if let Some(entity) = &found {
            let value = serde_json::to_value(entity).map_err(AppError::from)?;
            self.cache.set(key, value, SetOptions::new().entity_tag(keys::entity(self.resource, id)));
        }
        Ok(found)
    }

    async fn list(
        &self,
        predicate: &(dyn Fn(&T) -> bool + Send + Sync),
        offset: usize,
        limit: usize,
    ) -> AppResult<Page<T>> {
        // Lists are not cached here: the predicate is an opaque closure, so
        // there is no stable key to cache under without the caller supplying
        // a query fingerprint — that caching happens one layer up, in the
        // `DomainService`, which does have the original query params.
        self.inner.list(predicate, offset, limit).await
    }

    async fn insert(&self, entity: T) -> AppResult<T> {
        let saved = self.inner.insert(entity).await?;
        self.cache.invalidate_entity(&keys::entity(self.resource, saved.id()));
        Ok(saved)
    }

    async fn save(&self, entity: T) -> AppResult<T> {
        let id = entity.id().to_string();
        let saved = self.inner.save(entity).await?;
        self.cache.invalidate_entity(&keys::entity(self.resource, &id));
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let deleted = self.inner.delete(id).await?;
        self.cache.invalidate_entity(&keys::entity(self.resource, id));
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::customer::{Customer, CustomerStatus, NewCustomer};

    fn new_customer(id: &str, email: &str) -> Customer {
        Customer::create(NewCustomer {
            id: id.into(),
            name: "Acme".into(),
            email: email.into(),
            phone: None,
            billing_address: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let repo = InMemoryRepository::<Customer>::new();
        repo.insert(new_customer("C1", "a@b.com")).await.unwrap();
        let found = repo.find_by_id("C1").await.unwrap().unwrap();
        assert_eq!(found.email, "a@b.com");
    }

    #[tokio::test]
    async fn insert_duplicate_id_conflicts() {
        let repo = InMemoryRepository::<Customer>::new();
        repo.insert(new_customer("C1", "a@b.com")).await.unwrap();
        let err = repo.insert(new_customer("C1", "c@d.com")).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let repo = InMemoryRepository::<Customer>::new();
        let created = repo.insert(new_customer("C1", "a@b.com")).await.unwrap();

        let mut first_edit = created.clone();
        first_edit.deactivate();
        repo.save(first_edit).await.unwrap();

        // `created` still carries version 0; saving it again should conflict
        // against the now-version-1 stored row.
        let mut stale_edit = created;
        stale_edit.reactivate();
        let err = repo.save(stale_edit).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn cached_repository_serves_reads_from_cache_after_first_miss() {
        let inner = Arc::new(InMemoryRepository::<Customer>::new());
        inner.insert(new_customer("C1", "a@b.com")).await.unwrap();
        let cache = CacheEngine::new();
        let repo = CachedRepository::new(inner.clone(), cache.clone(), "customer");

        let first = repo.find_by_id("C1").await.unwrap().unwrap();
        assert_eq!(first.status, CustomerStatus::Active);
        assert_eq!(cache.stats().misses, 1);

        let second = repo.find_by_id("C1").await.unwrap().unwrap();
        assert_eq!(second.email, "a@b.com");
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn cached_repository_invalidates_on_save() {
        let inner = Arc::new(InMemoryRepository::<Customer>::new());
        let created = inner.insert(new_customer("C1", "a@b.com")).await.unwrap();
        let cache = CacheEngine::new();
        let repo = CachedRepository::new(inner, cache.clone(), "customer");

        repo.find_by_id("C1").await.unwrap();
        assert!(cache.get(&keys::entity("customer", "C1")).is_some());

        let mut updated = created;
        updated.deactivate();
        repo.save(updated).await.unwrap();
        assert!(cache.get(&keys::entity("customer", "C1")).is_none());
    }
}
