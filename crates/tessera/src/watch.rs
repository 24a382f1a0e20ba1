//! Deep watch: relaying descendant changes to a root object.
//!
//! Wiring walks the root's property bag. Every tracked descendant gets a
//! listener on its own ledger that prefixes the snapshot path with the route
//! from the root and hands the result to the root's callback:
//!
//! ```text
//! Lead ── proposals[] ── Proposal ── unit[] ── Unit
//!                                              │ set("consumption", 2)
//!                                              ▼
//!                     callback(Lead, "proposals.unit.consumption")
//! ```
//!
//! Listeners hold the root weakly. Relayed snapshots are not appended to any
//! intermediate ledger.
//!
//! The wiring follows the graph. A collection action or a write that moves
//! entities anywhere in the watched tree walks it again: new descendants get
//! a relay and ledgers no longer reached lose theirs.

use std::sync::Arc;

use crate::entity::Entity;
use crate::history::{Listener, WatchToken};
use crate::hooks::WatchCallback;
use crate::prop::Prop;
use crate::trace::Snapshot;

impl Entity {
    /// Relay every descendant change to `callback` with a root-relative path.
    ///
    /// Each call adds a new wiring, which follows descendants as they are
    /// added or removed. Call [`Entity::deep_watch_with`] to reuse a token.
    pub fn deep_watch<F>(&self, callback: F) -> WatchToken
    where
        F: Fn(&Entity, &Snapshot) + Send + Sync + 'static,
    {
        let token = WatchToken::new();
        wire(self, token, Arc::new(callback));
        token
    }

    /// (Re)wire `token`. Descendants already wired under it keep a single
    /// registration. Returns how many descendant ledgers are wired.
    pub fn deep_watch_with(&self, token: WatchToken, callback: WatchCallback) -> usize {
        wire(self, token, callback)
    }
}

pub(crate) fn wire(root: &Entity, token: WatchToken, callback: WatchCallback) -> usize {
    let mut reached: Vec<Entity> = Vec::new();
    let mut ancestors = vec![root.clone()];
    walk_entity(root, "", &mut ancestors, &mut |child: &Entity, path: &str| {
        if reached.iter().any(|seen| seen.ptr_eq(child)) {
            return;
        }
        if child.watch_ledger(token, relay(root, token, &callback, path)) {
            reached.push(child.clone());
        }
    });
    root.watch_ledger(token, follow_root(root, token, &callback));

    let dropped = root.replace_watched(token, &reached);
    for stale in &dropped {
        stale.unwatch_ledger(token);
    }

    tracing::debug!(
        root = %root.hash_code(),
        children = reached.len(),
        dropped = dropped.len(),
        "deep watch wired"
    );
    reached.len()
}

/// Listener on a descendant: rewire when the graph changed, then hand the
/// snapshot to the root's callback.
fn relay(root: &Entity, token: WatchToken, callback: &WatchCallback, path: &str) -> Listener {
    let weak_root = root.downgrade();
    let callback = callback.clone();
    let prefix = path.to_string();
    Arc::new(move |snapshot: &Snapshot| {
        let Some(root) = weak_root.upgrade() else {
            return;
        };
        if reshapes_graph(snapshot) {
            wire(&root, token, callback.clone());
        }
        callback(&root, &snapshot.prefixed(&prefix));
    })
}

/// Listener on the root itself: only keeps the wiring current.
fn follow_root(root: &Entity, token: WatchToken, callback: &WatchCallback) -> Listener {
    let weak_root = root.downgrade();
    let callback = callback.clone();
    Arc::new(move |snapshot: &Snapshot| {
        if !reshapes_graph(snapshot) {
            return;
        }
        if let Some(root) = weak_root.upgrade() {
            wire(&root, token, callback.clone());
        }
    })
}

fn reshapes_graph(snapshot: &Snapshot) -> bool {
    snapshot.action().is_some()
        || snapshot.from().is_some_and(Prop::contains_entity)
        || snapshot.to().is_some_and(Prop::contains_entity)
}

fn join(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn walk_entity(
    entity: &Entity,
    prefix: &str,
    ancestors: &mut Vec<Entity>,
    visit: &mut dyn FnMut(&Entity, &str),
) {
    for (field, value) in entity.props() {
        walk_prop(&value, &join(prefix, &field), ancestors, visit);
    }
}

fn walk_prop(value: &Prop, path: &str, ancestors: &mut Vec<Entity>, visit: &mut dyn FnMut(&Entity, &str)) {
    match value {
        Prop::Entity(child) => {
            if ancestors.iter().any(|a| a.ptr_eq(child)) {
                return;
            }
            visit(child, path);
            ancestors.push(child.clone());
            walk_entity(child, path, ancestors, visit);
            ancestors.pop();
        }
        Prop::List(items) => {
            for item in items {
                walk_prop(item, path, ancestors, visit);
            }
        }
        Prop::Record(fields) => {
            for (field, nested) in fields {
                walk_prop(nested, &join(path, field), ancestors, visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::EntityHooks;
    use crate::props;
    use parking_lot::Mutex;

    fn tree() -> (Entity, Entity, Entity) {
        let unit = Entity::create(&EntityHooks::builder("Unit").build(), props! { "id" => "U1", "consumption" => 1 }).unwrap();
        let proposal = Entity::create(
            &EntityHooks::builder("Proposal").build(),
            props! { "id" => "P1", "unit" => vec![unit.clone()] },
        )
        .unwrap();
        let lead = Entity::create(
            &EntityHooks::builder("Lead").build(),
            props! { "id" => "L1", "meta" => Prop::record([("owner", Prop::from(proposal.clone()))]) },
        )
        .unwrap();
        (lead, proposal, unit)
    }

    #[test]
    fn relayed_paths_are_root_relative() {
        let (lead, proposal, unit) = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        lead.deep_watch(move |root, snapshot| {
            sink.lock().push((root.id().to_string(), snapshot.field_path().to_string()));
        });

        unit.set("consumption", 2).unwrap();
        proposal.set("status", "sent").unwrap();

        assert_eq!(
            *seen.lock(),
            [
                ("L1".to_string(), "meta.owner.unit.consumption".to_string()),
                ("L1".to_string(), "meta.owner.status".to_string()),
            ]
        );
        // Relays do not land in the root's own ledger.
        assert!(lead.snapshots().unwrap().is_empty());
    }

    #[test]
    fn rewiring_the_same_token_is_idempotent() {
        let (lead, _, unit) = tree();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        let callback: WatchCallback = Arc::new(move |_: &Entity, _: &Snapshot| *sink.lock() += 1);
        let token = WatchToken::new();

        assert_eq!(lead.deep_watch_with(token, callback.clone()), 2);
        assert_eq!(lead.deep_watch_with(token, callback), 2);

        unit.set("consumption", 3).unwrap();
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn grandchildren_added_to_attached_children_are_relayed() {
        let (lead, proposal, _) = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        lead.deep_watch(move |_, snapshot| sink.lock().push(snapshot.field_path().to_string()));

        let late = Entity::create(&EntityHooks::builder("Unit").build(), props! { "id" => "U2", "consumption" => 1 }).unwrap();
        proposal.push("unit", late.clone()).unwrap();
        late.set("consumption", 4).unwrap();

        assert_eq!(*seen.lock(), ["meta.owner.unit", "meta.owner.unit.consumption"]);
    }

    #[test]
    fn detached_children_stop_relaying() {
        let (lead, proposal, unit) = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        lead.deep_watch(move |_, snapshot| sink.lock().push(snapshot.field_path().to_string()));

        proposal.pop("unit").unwrap();
        unit.set("consumption", 9).unwrap();
        lead.set("meta", Prop::record([("owner", Prop::Null)])).unwrap();
        proposal.set("status", "lost").unwrap();

        assert_eq!(*seen.lock(), ["meta.owner.unit"]);
    }

    #[test]
    fn dropped_root_silences_relays() {
        let (lead, _, unit) = tree();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();
        lead.deep_watch(move |_, _| *sink.lock() += 1);
        drop(lead);

        unit.set("consumption", 4).unwrap();
        assert_eq!(*hits.lock(), 0);
    }
}
