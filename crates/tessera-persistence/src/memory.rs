//! A repository that keeps primitive rows in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use tessera::{Aggregate, Id};
use tokio::sync::RwLock;

use crate::adapter::Adapter;
use crate::changes::ChangeSet;
use crate::repository::Repository;

/// Writes seen by an [`InMemoryRepository`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryOp {
    Created(Id),
    Updated { id: Id, keys: Vec<String> },
    Deleted(Id),
}

/// Stores aggregates as their primitive projection and rebuilds them
/// through an [`Adapter`] on `find`.
pub struct InMemoryRepository {
    rows: RwLock<HashMap<Id, serde_json::Value>>,
    ops: RwLock<Vec<RepositoryOp>>,
    to_domain: Box<dyn Adapter<serde_json::Value, Aggregate>>,
}

impl InMemoryRepository {
    pub fn new(to_domain: impl Adapter<serde_json::Value, Aggregate> + 'static) -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            ops: RwLock::new(Vec::new()),
            to_domain: Box::new(to_domain),
        }
    }

    pub async fn row(&self, id: &Id) -> Option<serde_json::Value> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn ops(&self) -> Vec<RepositoryOp> {
        self.ops.read().await.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find(&self, id: &Id) -> anyhow::Result<Option<Aggregate>> {
        let Some(row) = self.row(id).await else {
            return Ok(None);
        };
        Ok(Some(self.to_domain.build(row)?))
    }

    async fn create(&self, aggregate: &Aggregate) -> anyhow::Result<()> {
        let id = aggregate.id().clone();
        let mut rows = self.rows.write().await;
        if rows.contains_key(&id) {
            anyhow::bail!("{} already exists", aggregate.hash_code());
        }
        rows.insert(id.clone(), aggregate.to_primitives());
        self.ops.write().await.push(RepositoryOp::Created(id));
        Ok(())
    }

    async fn update(&self, aggregate: &Aggregate, changes: &ChangeSet) -> anyhow::Result<()> {
        let id = aggregate.id().clone();
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(id.clone())
            .or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let serde_json::Value::Object(fields) = row {
            for field in changes.fields() {
                fields.insert(field.key.clone(), field.current.clone());
            }
        }
        tracing::trace!(
            aggregate = %aggregate.hash_code(),
            keys = ?changes.changed_keys(),
            "row updated"
        );
        self.ops.write().await.push(RepositoryOp::Updated {
            id,
            keys: changes.changed_keys().into_iter().map(String::from).collect(),
        });
        Ok(())
    }

    async fn delete(&self, id: &Id) -> anyhow::Result<bool> {
        let removed = self.rows.write().await.remove(id).is_some();
        if removed {
            self.ops.write().await.push(RepositoryOp::Deleted(id.clone()));
        }
        Ok(removed)
    }
}
