//! Transactional outbox for Tessera.
//!
//! [`Outbox`] is an [`EventPublisher`] that does not deliver anything: it
//! turns each dispatched [`DomainEvent`] into an [`OutboxRecord`] keyed by a
//! fresh id. A relay process (out of scope here) later reads the pending
//! records with [`Outbox::pending`] or [`Outbox::take`], delivers them and
//! acknowledges them.
//!
//! ```ignore
//! let outbox = Outbox::new();
//! lead.dispatch_all(&outbox).await?;
//! for record in outbox.take(100) {
//!     broker.send(&record.event_name, &record.payload).await?;
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tessera::{DomainEvent, EventPublisher};
use uuid::Uuid;

/// One dispatched event, stored for later delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub id: Uuid,
    /// Insertion order within one outbox.
    pub sequence: u64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_name: String,
    pub payload: serde_json::Value,
    /// When the event was raised on the aggregate.
    pub created_at: DateTime<Utc>,
    /// When the outbox stored it.
    pub recorded_at: DateTime<Utc>,
}

impl OutboxRecord {
    fn from_event(event: &DomainEvent, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            aggregate_id: event.aggregate_id().value().to_string(),
            aggregate_type: event.aggregate().type_tag().to_string(),
            event_name: event.name().to_string(),
            payload: event.payload().clone(),
            created_at: event.created_at(),
            recorded_at: Utc::now(),
        }
    }
}

/// In-memory outbox table.
#[derive(Debug, Default)]
pub struct Outbox {
    records: DashMap<Uuid, OutboxRecord>,
    next_sequence: AtomicU64,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every stored record, oldest first.
    pub fn pending(&self) -> Vec<OutboxRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Stored records raised by one aggregate, oldest first.
    pub fn for_aggregate(&self, aggregate_id: &str) -> Vec<OutboxRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.aggregate_id == aggregate_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Remove and return up to `limit` of the oldest records.
    pub fn take(&self, limit: usize) -> Vec<OutboxRecord> {
        let mut taken = Vec::new();
        for record in self.pending().into_iter().take(limit) {
            if let Some((_, record)) = self.records.remove(&record.id) {
                taken.push(record);
            }
        }
        taken
    }

    /// Acknowledge one delivered record.
    pub fn acknowledge(&self, id: &Uuid) -> bool {
        self.records.remove(id).is_some()
    }
}

#[async_trait]
impl EventPublisher for Outbox {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let record = OutboxRecord::from_event(event, sequence);
        tracing::trace!(
            record = %record.id,
            aggregate = %record.aggregate_id,
            event = %record.event_name,
            "outbox record stored"
        );
        self.records.insert(record.id, record);
        Ok(())
    }
}
