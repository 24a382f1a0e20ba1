//! Per-key change resolution for persistence adapters.

use std::fmt;

use crate::entity::{lookup, Entity};
use crate::error::{DomainError, Result};
use crate::prop::Prop;
use crate::reconcile::{reconcile, Reconciliation};
use crate::trace::Snapshot;

/// What changed under one subscribed key.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The key holds a single value; `entity` is its current state.
    Single { entity: Prop },
    /// The key holds a list, reconciled against its initial state.
    Collection {
        entity: Prop,
        changes: Reconciliation<Prop>,
    },
}

impl Resolved {
    /// Current value under the key.
    pub fn entity(&self) -> &Prop {
        match self {
            Self::Single { entity } | Self::Collection { entity, .. } => entity,
        }
    }

    pub fn changes(&self) -> Option<&Reconciliation<Prop>> {
        match self {
            Self::Collection { changes, .. } => Some(changes),
            Self::Single { .. } => None,
        }
    }
}

type Handler<'a> = Box<dyn FnMut(Resolved, &[Snapshot]) + 'a>;

/// Handlers keyed by field, passed to [`Entity::subscribe`].
#[derive(Default)]
pub struct Subscription<'a> {
    handlers: Vec<(String, Handler<'a>)>,
}

impl<'a> Subscription<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle changes under `key`. The handler also receives every snapshot
    /// found for the key, with root-relative paths.
    pub fn on<F>(mut self, key: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(Resolved, &[Snapshot]) + 'a,
    {
        self.handlers.push((key.into(), Box::new(handler)));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(key, _)| key.as_str())
    }
}

impl fmt::Debug for Subscription<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

impl Entity {
    /// Resolve what changed under each subscribed key since construction.
    ///
    /// Keys with no recorded change (in this object's ledger or, for child
    /// entities, in theirs) are skipped. List-valued keys are reconciled
    /// against their initial value.
    pub fn subscribe(&self, subscription: Subscription<'_>) -> Result<()> {
        let history = self.history()?;

        for key in subscription.keys() {
            if key.is_empty() || key == "self" {
                return Err(DomainError::InvalidSubscriber {
                    instance: self.hash_code(),
                    key: key.to_string(),
                    reason: "reserved or empty key".to_string(),
                });
            }
        }

        for (key, mut handler) in subscription.handlers {
            let current = self.get(&key);

            let mut snapshots: Vec<Snapshot> =
                history.snapshots_touching(&key).into_iter().cloned().collect();
            if snapshots.is_empty() {
                if let Some(current) = &current {
                    collect_child_snapshots(current, &key, &mut snapshots);
                }
            }
            if snapshots.is_empty() {
                continue;
            }

            let initial = lookup(history.initial_props(), &key).filter(|p| !p.is_null());
            let current = current.filter(|p| !p.is_null());
            let (initial, current) = match (initial, current) {
                (Some(initial), Some(current)) => (initial, current),
                (initial, current) => {
                    return Err(DomainError::UnresolvedPath {
                        instance: self.hash_code(),
                        key,
                        has_initial: initial.is_some(),
                        has_current: current.is_some(),
                    });
                }
            };

            tracing::debug!(
                entity = %self.hash_code(),
                key = %key,
                snapshots = snapshots.len(),
                "resolved subscription"
            );

            let resolved = match (&initial, &current) {
                (Prop::List(before), Prop::List(after)) => Resolved::Collection {
                    changes: reconcile(before, after),
                    entity: current.clone(),
                },
                _ => Resolved::Single { entity: current },
            };
            handler(resolved, &snapshots);
        }

        Ok(())
    }
}

/// Snapshots recorded by child entities under `value`, recursively, with
/// paths prefixed relative to the subscribed object.
fn collect_child_snapshots(value: &Prop, prefix: &str, out: &mut Vec<Snapshot>) {
    for child in value.entities() {
        if let Ok(snapshots) = child.snapshots() {
            out.extend(snapshots.iter().map(|s| s.prefixed(prefix)));
        }
        for (field, nested) in child.props() {
            collect_child_snapshots(&nested, &format!("{prefix}.{field}"), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::EntityHooks;
    use crate::props;

    fn unit(id: &str, consumption: i64) -> Entity {
        Entity::create(
            &EntityHooks::builder("Unit").build(),
            props! { "id" => id, "consumption" => consumption },
        )
        .unwrap()
    }

    fn proposal(units: Vec<Entity>) -> Entity {
        Entity::create(
            &EntityHooks::builder("Proposal").build(),
            props! { "id" => "P1", "unit" => units, "status" => "draft" },
        )
        .unwrap()
    }

    #[test]
    fn untouched_keys_are_skipped() {
        let p = proposal(vec![unit("U1", 1)]);
        let mut called = false;
        p.subscribe(Subscription::new().on("unit", |_, _| called = true))
            .unwrap();
        assert!(!called);
    }

    #[test]
    fn list_keys_are_reconciled() {
        let p = proposal(vec![unit("U1", 1), unit("U2", 1)]);
        p.push("unit", unit("U3", 1)).unwrap();
        p.remove_first("unit").unwrap();

        let mut result = None;
        p.subscribe(Subscription::new().on("unit", |resolved, snapshots| {
            result = Some((resolved, snapshots.len()));
        }))
        .unwrap();

        let (resolved, count) = result.unwrap();
        assert_eq!(count, 2);
        let changes = resolved.changes().unwrap();
        fn ids(items: &[Prop]) -> Vec<String> {
            items
                .iter()
                .filter_map(|p| p.as_entity().map(|e| e.id().to_string()))
                .collect()
        }
        assert_eq!(ids(&changes.to_create), ["U3"]);
        assert_eq!(ids(&changes.to_delete), ["U1"]);
        assert!(changes.to_update.is_empty());
    }

    #[test]
    fn child_changes_are_found_through_child_ledgers() {
        let u1 = unit("U1", 1);
        let p = proposal(vec![u1.clone()]);
        u1.set("consumption", 5).unwrap();

        let mut paths = Vec::new();
        let mut updated = Vec::new();
        p.subscribe(Subscription::new().on("unit", |resolved, snapshots| {
            paths.extend(snapshots.iter().map(|s| s.field_path().to_string()));
            updated.extend(resolved.changes().map(|c| c.to_update.clone()).unwrap_or_default());
        }))
        .unwrap();

        assert_eq!(paths, ["unit.consumption"]);
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].as_entity().unwrap().get("consumption"), Some(Prop::from(5)));
    }

    #[test]
    fn scalar_keys_resolve_to_single() {
        let p = proposal(vec![]);
        p.set("status", "sent").unwrap();
        let mut resolved = None;
        p.subscribe(Subscription::new().on("status", |r, _| resolved = Some(r)))
            .unwrap();
        assert_eq!(
            resolved,
            Some(Resolved::Single {
                entity: Prop::from("sent")
            })
        );
    }

    #[test]
    fn reserved_and_empty_keys_are_rejected() {
        let p = proposal(vec![]);
        for key in ["self", ""] {
            let err = p.subscribe(Subscription::new().on(key, |_, _| {})).unwrap_err();
            assert!(matches!(err, DomainError::InvalidSubscriber { .. }));
        }
    }

    #[test]
    fn missing_initial_value_is_unresolved() {
        let p = proposal(vec![]);
        p.set("owner", "ada").unwrap();
        let err = p
            .subscribe(Subscription::new().on("owner", |_, _| {}))
            .unwrap_err();
        match err {
            DomainError::UnresolvedPath {
                key,
                has_initial,
                has_current,
                ..
            } => {
                assert_eq!(key, "owner");
                assert!(!has_initial);
                assert!(has_current);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn untracked_objects_cannot_subscribe() {
        let hooks = EntityHooks::builder("Note").without_history().build();
        let note = Entity::create(&hooks, props! { "id" => "N1" }).unwrap();
        assert!(matches!(
            note.subscribe(Subscription::new()),
            Err(DomainError::HistoryDisabled { .. })
        ));
    }
}
