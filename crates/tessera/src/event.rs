//! Domain events queued on aggregates.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::aggregate::Aggregate;
use crate::entity::WeakEntity;
use crate::id::Id;

/// Non-owning reference from an event back to the aggregate that raised it.
#[derive(Clone)]
pub struct AggregateRef {
    id: Id,
    type_tag: String,
    handle: WeakEntity,
}

impl AggregateRef {
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The aggregate, if it is still alive.
    pub fn upgrade(&self) -> Option<Aggregate> {
        self.handle.upgrade().and_then(|e| e.as_aggregate())
    }
}

impl fmt::Debug for AggregateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Aggregate@{}]:{}", self.type_tag, self.id)
    }
}

/// Something that happened to an aggregate, pending dispatch.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    aggregate: AggregateRef,
    name: String,
    created_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(aggregate: &Aggregate, name: impl Into<String>) -> Self {
        Self {
            aggregate: AggregateRef {
                id: aggregate.id().clone(),
                type_tag: aggregate.type_tag().to_string(),
                handle: aggregate.downgrade(),
            },
            name: name.into(),
            created_at: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aggregate(&self) -> &AggregateRef {
        &self.aggregate
    }

    pub fn aggregate_id(&self) -> &Id {
        &self.aggregate.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

impl Serialize for DomainEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DomainEvent", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("aggregateId", &self.aggregate.id)?;
        state.serialize_field("aggregateType", &self.aggregate.type_tag)?;
        state.serialize_field(
            "createdAt",
            &self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        state.serialize_field("payload", &self.payload)?;
        state.end()
    }
}

/// How [`Aggregate::add_event`] treats events already queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventReplace {
    /// Append alongside any existing events.
    #[default]
    Keep,
    /// Drop queued events with the same name and aggregate first.
    ReplaceDuplicated,
}

/// Receives dispatched events.
///
/// Implementations are called concurrently for the events of one dispatch.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        (**self).publish(event).await
    }
}
