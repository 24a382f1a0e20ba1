//! Aggregates: tracked objects that own a domain-event queue.
//!
//! Dispatch is remove-before-publish and at-most-once. Matching events leave
//! the queue before any publisher runs, are published concurrently, and are
//! not re-queued on failure: the [`DispatchError`] hands the failed events
//! back to the caller instead.

use std::ops::Deref;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::entity::{Entity, Kind};
use crate::error::{DispatchError, PublishFailure, Result};
use crate::event::{DomainEvent, EventPublisher, EventReplace};
use crate::hooks::EntityHooks;
use crate::prop::{Prop, Props};
use crate::reconcile::{Matching, Reconcilable};

/// An entity acting as a consistency boundary and event source.
#[derive(Clone, PartialEq)]
pub struct Aggregate(Entity);

impl Aggregate {
    pub fn create(hooks: &Arc<EntityHooks>, props: Props) -> Result<Self> {
        Entity::construct(hooks, props, Kind::Aggregate).map(Self)
    }

    pub(crate) fn from_entity(entity: Entity) -> Self {
        Self(entity)
    }

    pub fn entity(&self) -> &Entity {
        &self.0
    }

    pub fn into_entity(self) -> Entity {
        self.0
    }

    /// See [`Entity::clone_entity`]. Queued events are not copied.
    pub fn clone_aggregate(&self) -> Result<Aggregate> {
        self.0.clone_entity().map(Self)
    }

    // --- queue ---

    pub fn add_event(&self, event: DomainEvent, replace: EventReplace) {
        let mut state = self.0.lock();
        if replace == EventReplace::ReplaceDuplicated {
            state
                .events
                .retain(|e| e.name() != event.name() || e.aggregate_id() != event.aggregate_id());
        }
        state.events.push(event);
    }

    /// Queue an event named `name` raised by this aggregate.
    pub fn raise(&self, name: impl Into<String>, payload: serde_json::Value) {
        self.add_event(
            DomainEvent::new(self, name).with_payload(payload),
            EventReplace::Keep,
        );
    }

    /// Remove every queued event named `name`. Returns how many were removed.
    pub fn remove_event(&self, name: &str) -> usize {
        let mut state = self.0.lock();
        let before = state.events.len();
        state.events.retain(|e| e.name() != name);
        before - state.events.len()
    }

    pub fn clear_events(&self) {
        self.0.lock().events.clear();
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.0.lock().events.clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<DomainEvent> {
        self.0
            .lock()
            .events
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }

    pub fn has_event(&self, name: &str) -> bool {
        self.0.lock().events.iter().any(|e| e.name() == name)
    }

    pub fn event_count(&self) -> usize {
        self.0.lock().events.len()
    }

    fn drain_where(&self, keep: impl Fn(&DomainEvent) -> bool) -> Vec<DomainEvent> {
        let mut state = self.0.lock();
        let (kept, drained): (Vec<_>, Vec<_>) = std::mem::take(&mut state.events)
            .into_iter()
            .partition(|e| keep(e));
        state.events = kept;
        drained
    }

    // --- dispatch ---

    /// Publish and remove the queued events named `name` raised by this
    /// aggregate. Other events stay queued. Returns how many were published.
    pub async fn dispatch<P>(&self, name: &str, publisher: &P) -> std::result::Result<usize, DispatchError>
    where
        P: EventPublisher + ?Sized,
    {
        let id = self.id().clone();
        let events = self.drain_where(|e| e.name() != name || e.aggregate_id() != &id);
        self.publish_batch(events, publisher).await
    }

    /// Drain and publish the queues of this aggregate and of every aggregate
    /// reachable through its properties.
    pub async fn dispatch_all<P>(&self, publisher: &P) -> std::result::Result<usize, DispatchError>
    where
        P: EventPublisher + ?Sized,
    {
        let events = self
            .reachable_aggregates()
            .iter()
            .flat_map(|aggregate| aggregate.drain_where(|_| false))
            .collect();
        self.publish_batch(events, publisher).await
    }

    /// This aggregate first, then descendants in property order, each once.
    pub fn reachable_aggregates(&self) -> Vec<Aggregate> {
        let mut found = vec![self.clone()];
        let mut visited = vec![self.0.clone()];
        collect_aggregates(&self.0, &mut visited, &mut found);
        found
    }

    async fn publish_batch<P>(
        &self,
        events: Vec<DomainEvent>,
        publisher: &P,
    ) -> std::result::Result<usize, DispatchError>
    where
        P: EventPublisher + ?Sized,
    {
        let attempted = events.len();
        if attempted == 0 {
            return Ok(0);
        }

        let aggregate = self.hash_code();
        debug!(aggregate = %aggregate, events = attempted, "dispatching events");

        let results = join_all(events.iter().map(|event| publisher.publish(event))).await;

        let failures: Vec<PublishFailure> = events
            .into_iter()
            .zip(results)
            .filter_map(|(event, result)| {
                result.err().map(|error| {
                    warn!(
                        aggregate = %event.aggregate().id(),
                        event = event.name(),
                        error = %error,
                        "event publish failed"
                    );
                    PublishFailure { event, error }
                })
            })
            .collect();

        if failures.is_empty() {
            Ok(attempted)
        } else {
            Err(DispatchError {
                aggregate,
                attempted,
                failures,
            })
        }
    }
}

fn collect_aggregates(entity: &Entity, visited: &mut Vec<Entity>, found: &mut Vec<Aggregate>) {
    for value in entity.props().into_values() {
        collect_from_prop(&value, visited, found);
    }
}

fn collect_from_prop(value: &Prop, visited: &mut Vec<Entity>, found: &mut Vec<Aggregate>) {
    match value {
        Prop::Entity(child) => {
            if visited.iter().any(|seen| seen.ptr_eq(child)) {
                return;
            }
            visited.push(child.clone());
            if let Some(aggregate) = child.as_aggregate() {
                found.push(aggregate);
            }
            collect_aggregates(child, visited, found);
        }
        Prop::List(items) => {
            for item in items {
                collect_from_prop(item, visited, found);
            }
        }
        Prop::Record(fields) => {
            for nested in fields.values() {
                collect_from_prop(nested, visited, found);
            }
        }
        _ => {}
    }
}

impl Deref for Aggregate {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.0
    }
}

impl std::fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Aggregate").field(&self.hash_code()).finish()
    }
}

impl From<Aggregate> for Prop {
    fn from(value: Aggregate) -> Self {
        Prop::Entity(value.0)
    }
}

impl From<Aggregate> for Entity {
    fn from(value: Aggregate) -> Self {
        value.0
    }
}

impl Reconcilable for Aggregate {
    fn matching(&self, other: &Self) -> Matching {
        self.0.matching(&other.0)
    }
}

impl serde::Serialize for Aggregate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    #[async_trait]
    impl EventPublisher for Collect {
        async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
            self.0.lock().push(format!("{}:{}", event.aggregate_id(), event.name()));
            Ok(())
        }
    }

    struct RejectNamed(&'static str);

    #[async_trait]
    impl EventPublisher for RejectNamed {
        async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
            if event.name() == self.0 {
                anyhow::bail!("broker rejected {}", event.name());
            }
            Ok(())
        }
    }

    fn lead(id: &str) -> Aggregate {
        Aggregate::create(&EntityHooks::builder("Lead").build(), props! { "id" => id }).unwrap()
    }

    #[test]
    fn replace_duplicated_keeps_latest() {
        let l = lead("L1");
        l.add_event(DomainEvent::new(&l, "LeadUpdated").with_payload(1.into()), EventReplace::ReplaceDuplicated);
        l.add_event(DomainEvent::new(&l, "LeadUpdated").with_payload(2.into()), EventReplace::ReplaceDuplicated);
        l.add_event(DomainEvent::new(&l, "LeadUpdated").with_payload(3.into()), EventReplace::Keep);

        let events = l.events_named("LeadUpdated");
        let payloads: Vec<_> = events.iter().map(|e| e.payload().clone()).collect();
        assert_eq!(payloads, [serde_json::json!(2), serde_json::json!(3)]);
    }

    #[test]
    fn replace_only_touches_same_aggregate() {
        let l1 = lead("L1");
        let l2 = lead("L2");
        l1.add_event(DomainEvent::new(&l2, "LeadUpdated"), EventReplace::Keep);
        l1.add_event(DomainEvent::new(&l1, "LeadUpdated"), EventReplace::ReplaceDuplicated);
        assert_eq!(l1.event_count(), 2);
    }

    #[test]
    fn remove_and_clear() {
        let l = lead("L1");
        l.raise("A", serde_json::Value::Null);
        l.raise("A", serde_json::Value::Null);
        l.raise("B", serde_json::Value::Null);
        assert_eq!(l.remove_event("A"), 2);
        assert!(!l.has_event("A"));
        assert!(l.has_event("B"));
        l.clear_events();
        assert_eq!(l.event_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_drains_matching_events_only() {
        let l1 = lead("L1");
        let l2 = lead("L2");
        l1.raise("X", serde_json::Value::Null);
        l1.raise("Y", serde_json::Value::Null);
        l1.add_event(DomainEvent::new(&l2, "X"), EventReplace::Keep);

        let publisher = Collect::default();
        assert_eq!(l1.dispatch("X", &publisher).await.unwrap(), 1);

        assert_eq!(*publisher.0.lock(), ["L1:X"]);
        let left: Vec<_> = l1
            .events()
            .iter()
            .map(|e| format!("{}:{}", e.aggregate_id(), e.name()))
            .collect();
        assert_eq!(left, ["L1:Y", "L2:X"]);
    }

    #[tokio::test]
    async fn dispatch_all_walks_child_aggregates_once() {
        let child = lead("C1");
        let holder = Entity::create(
            &EntityHooks::builder("Holder").build(),
            props! { "id" => "H1", "inner" => child.clone() },
        )
        .unwrap();
        let root = Aggregate::create(
            &EntityHooks::builder("Root").build(),
            props! {
                "id" => "R1",
                "direct" => vec![child.clone()],
                "nested" => Prop::record([("holder", holder)]),
            },
        )
        .unwrap();

        root.raise("RootChanged", serde_json::Value::Null);
        child.raise("ChildChanged", serde_json::Value::Null);

        let publisher = Collect::default();
        assert_eq!(root.dispatch_all(&publisher).await.unwrap(), 2);
        let mut published = publisher.0.lock().clone();
        published.sort();
        assert_eq!(published, ["C1:ChildChanged", "R1:RootChanged"]);
        assert_eq!(root.event_count() + child.event_count(), 0);
    }

    #[tokio::test]
    async fn failed_publishes_are_returned_not_requeued() {
        let l = lead("L1");
        l.raise("Ok", serde_json::Value::Null);
        l.raise("Bad", serde_json::Value::Null);

        let err = l.dispatch_all(&RejectNamed("Bad")).await.unwrap_err();
        assert_eq!(err.attempted, 2);
        assert_eq!(err.failed_event_names(), ["Bad"]);
        assert_eq!(l.event_count(), 0);
        assert_eq!(err.to_string(), "1 of 2 event publish(es) failed for [Aggregate@Lead]:L1");

        for event in err.into_events() {
            l.add_event(event, EventReplace::Keep);
        }
        assert!(l.has_event("Bad"));
    }

    #[test]
    fn aggregate_reports_its_kind() {
        let l = lead("L1");
        assert!(l.is_aggregate());
        assert_eq!(l.hash_code(), "[Aggregate@Lead]:L1");
        let as_entity: Entity = l.clone().into();
        assert!(as_entity.as_aggregate().is_some());
    }
}
