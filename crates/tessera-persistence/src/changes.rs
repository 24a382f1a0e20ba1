//! Key-by-key change sets built from `subscribe`.

use std::cell::RefCell;

use serde::Serialize;
use smallvec::SmallVec;
use tessera::{Entity, Resolved, Snapshot, Subscription};

use crate::error::PersistenceError;

type Rows = SmallVec<[serde_json::Value; 4]>;

/// What changed under one top-level key, projected to primitives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChanges {
    pub key: String,
    /// Current value under the key.
    pub current: serde_json::Value,
    pub to_create: Rows,
    pub to_update: Rows,
    pub to_delete: Rows,
    /// Paths of the snapshots that triggered this entry.
    pub paths: SmallVec<[String; 4]>,
}

impl FieldChanges {
    fn new(key: String, resolved: Resolved, snapshots: &[Snapshot]) -> Self {
        let paths = snapshots
            .iter()
            .map(|s| s.field_path().to_string())
            .collect();
        let current = resolved.entity().to_primitive();
        match resolved {
            Resolved::Collection { changes, .. } => {
                let changes = changes.map(|p| p.to_primitive());
                Self {
                    key,
                    current,
                    to_create: changes.to_create.into_iter().collect(),
                    to_update: changes.to_update.into_iter().collect(),
                    to_delete: changes.to_delete.into_iter().collect(),
                    paths,
                }
            }
            Resolved::Single { .. } => Self {
                key,
                current,
                to_create: Rows::new(),
                to_update: Rows::new(),
                to_delete: Rows::new(),
                paths,
            },
        }
    }

    /// Whether the key holds a reconciled list.
    pub fn is_collection(&self) -> bool {
        self.current.is_array()
    }
}

/// Every changed key of one tracked object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    fields: Vec<FieldChanges>,
}

impl ChangeSet {
    /// Resolve changes for `keys`. Keys without recorded changes are left out.
    pub fn collect(entity: &Entity, keys: &[&str]) -> Result<Self, PersistenceError> {
        let fields = RefCell::new(Vec::new());
        let sink = &fields;

        let subscription = keys.iter().fold(Subscription::new(), |subscription, key| {
            let key = key.to_string();
            subscription.on(key.clone(), move |resolved, snapshots| {
                sink.borrow_mut()
                    .push(FieldChanges::new(key.clone(), resolved, snapshots));
            })
        });
        entity.subscribe(subscription)?;

        Ok(Self {
            fields: fields.into_inner(),
        })
    }

    /// Resolve changes for every property except `id`.
    pub fn collect_all(entity: &Entity) -> Result<Self, PersistenceError> {
        let keys: Vec<String> = entity
            .props()
            .into_keys()
            .filter(|key| key != "id")
            .collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        Self::collect(entity, &keys)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldChanges] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldChanges> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn changed_keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }
}
