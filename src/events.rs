//! Intra-process publish/subscribe for domain events (C2).
//!
//! Aggregates never publish directly (§9: "Event emission via mutable list
//! on aggregate" is re-architected so aggregates only *return* events).
//! `DomainService` drains an aggregate's pending events after a successful
//! `Repository::save` and publishes them here. Delivery is per-publisher
//! FIFO (§5); across publishers, order is unspecified because each
//! `publish` call simply broadcasts independently.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A domain event emitted by an aggregate operation. Concrete events (e.g.
/// `InspectionCreated`) implement this and are boxed for transport on the
/// bus; `payload()` carries whatever the subscriber needs without forcing a
/// shared enum across aggregates.
pub trait DomainEvent: fmt::Debug + Send + Sync {
    /// Stable event name, e.g. `"InspectionCreated"`.
    fn event_type(&self) -> &'static str;
    /// Aggregate id the event concerns.
    fn aggregate_id(&self) -> &str;
    /// JSON payload for subscribers that don't need the concrete type.
    fn payload(&self) -> Value;
}

/// Envelope placed on the bus; carries bookkeeping the raw [`DomainEvent`]
/// doesn't need to know about.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            occurred_at: Utc::now(),
            payload: event.payload(),
        }
    }
}

/// In-process publish/subscribe bus. One `broadcast` channel per publisher
/// keeps FIFO ordering within a publisher without forcing a single global
/// lock; `publish_as` lets a caller identify itself (e.g. `"inspection"`,
/// `"component"`) so subscribers can filter without inspecting payloads.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a batch of events for one aggregate, in order. Used by
    /// `DomainService` after `save()` succeeds; events appended to an
    /// aggregate during one operation are always published together and in
    /// the order they were appended, satisfying per-publisher FIFO.
    pub fn publish_all(&self, events: Vec<Box<dyn DomainEvent>>) {
        for event in events {
            let envelope = EventEnvelope::from_event(event.as_ref());
            // A broadcast channel with no receivers returns Err; that's a
            // normal steady state (no consumers started yet) and not an
            // error worth surfacing to the caller.
            let _ = self.tx.send(envelope);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestEvent {
        id: String,
        seq: u32,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "TestEvent"
        }
        fn aggregate_id(&self) -> &str {
            &self.id
        }
        fn payload(&self) -> Value {
            serde_json::json!({ "seq": self.seq })
        }
    }

    #[tokio::test]
    async fn delivers_events_in_publisher_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let events: Vec<Box<dyn DomainEvent>> = vec![
            Box::new(TestEvent { id: "A1".into(), seq: 1 }),
            Box::new(TestEvent { id: "A1".into(), seq: 2 }),
            Box::new(TestEvent { id: "A1".into(), seq: 3 }),
        ];
        bus.publish_all(events);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.payload["seq"], 1);
        assert_eq!(second.payload["seq"], 2);
        assert_eq!(third.payload["seq"], 3);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new(16);
        bus.publish_all(vec![Box::new(TestEvent { id: "A2".into(), seq: 1 })]);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
