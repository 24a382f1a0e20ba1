use async_trait::async_trait;
use tessera::{Aggregate, EventPublisher, Id};

use crate::changes::ChangeSet;
use crate::error::PersistenceError;

/// Storage contract for one aggregate type.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find(&self, id: &Id) -> anyhow::Result<Option<Aggregate>>;

    async fn create(&self, aggregate: &Aggregate) -> anyhow::Result<()>;

    /// Persist `changes`. Only keys present in the change set were touched.
    async fn update(&self, aggregate: &Aggregate, changes: &ChangeSet) -> anyhow::Result<()>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: &Id) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated { keys: Vec<String> },
    /// Nothing tracked changed; the repository was not called.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub outcome: SaveOutcome,
    /// Events published after the write.
    pub published: usize,
}

/// Write `aggregate` and then dispatch every event reachable from it.
///
/// Aggregates with a generated id are created, others are updated with
/// their [`ChangeSet`]. Events are only dispatched once the write succeeded.
pub async fn save<R, P>(
    repository: &R,
    aggregate: &Aggregate,
    publisher: &P,
) -> Result<SaveReport, PersistenceError>
where
    R: Repository + ?Sized,
    P: EventPublisher + ?Sized,
{
    let outcome = if aggregate.is_new() {
        repository
            .create(aggregate)
            .await
            .map_err(PersistenceError::repository("create"))?;
        SaveOutcome::Created
    } else {
        let changes = ChangeSet::collect_all(aggregate)?;
        if changes.is_empty() {
            SaveOutcome::Unchanged
        } else {
            repository
                .update(aggregate, &changes)
                .await
                .map_err(PersistenceError::repository("update"))?;
            SaveOutcome::Updated {
                keys: changes.changed_keys().into_iter().map(String::from).collect(),
            }
        }
    };

    let published = aggregate.dispatch_all(publisher).await?;

    tracing::debug!(
        aggregate = %aggregate.hash_code(),
        outcome = ?outcome,
        published,
        "aggregate saved"
    );

    Ok(SaveReport { outcome, published })
}
