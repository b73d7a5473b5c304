//! Aggregate root base (§3, §9).
//!
//! Replaces a `markModified`-on-a-mutable-list pattern with an explicit
//! event log: an aggregate never publishes anything itself. Every state-
//! changing method appends to an internal [`EventLog`] and returns
//! `AppResult<()>` (or the created aggregate, for constructors); the caller
//! — always a `DomainService` — drains the log with `take_events()` only
//! after `Repository::save` has succeeded, and publishes to the
//! [`crate::events::EventBus`] itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::DomainEvent;

/// Buffer of events appended by aggregate operations during one call chain.
/// Deliberately *not* `Clone`-derived to carry state across clones of the
/// owning aggregate: a cloned snapshot (e.g. one handed to a cache) starts
/// with an empty log, since pending events are a property of one in-flight
/// mutation, not of the entity's data.
#[derive(Debug, Default)]
pub struct EventLog(Vec<Box<dyn DomainEvent>>);

impl EventLog {
    pub fn record(&mut self, event: impl DomainEvent + 'static) {
        self.0.push(Box::new(event));
    }

    pub fn take(&mut self) -> Vec<Box<dyn DomainEvent>> {
        std::mem::take(&mut self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        EventLog::default()
    }
}

/// Common aggregate-root bookkeeping: identity, timestamps, and the
/// optimistic-concurrency token. `version` is bumped by the `Repository` on
/// every successful `save`, not by the aggregate itself — a stale `version`
/// observed at save time is what produces `conflict` (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl AggregateMeta {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self { id: id.into(), created_at: now, updated_at: now, version: 0 }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Implemented by every aggregate root so generic infrastructure (the
/// `Repository`, `DomainService`) can work uniformly across Inspection,
/// Component, and Customer.
pub trait AggregateRoot {
    fn id(&self) -> &str;
    fn version(&self) -> u64;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;
    /// Drain and return this aggregate's pending domain events. Called by
    /// `DomainService` only after a successful `save`.
    fn take_events(&mut self) -> Vec<Box<dyn DomainEvent>>;
    fn has_pending_events(&self) -> bool;
    /// Set the optimistic-concurrency version. Called only by a
    /// `Repository` after a successful `save`, never by application code.
    fn bump_version(&mut self, version: u64);
}

#[macro_export]
macro_rules! impl_aggregate_root {
    ($ty:ty) => {
        impl $crate::domain::aggregate::AggregateRoot for $ty {
            fn id(&self) -> &str {
                &self.meta.id
            }
            fn version(&self) -> u64 {
                self.meta.version
            }
            fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.meta.created_at
            }
            fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
                self.meta.updated_at
            }
            fn take_events(&mut self) -> Vec<Box<dyn $crate::events::DomainEvent>> {
                self.events.take()
            }
            fn has_pending_events(&self) -> bool {
                !self.events.is_empty()
            }
            fn bump_version(&mut self, version: u64) {
                self.meta.version = version;
            }
        }
    };
}
