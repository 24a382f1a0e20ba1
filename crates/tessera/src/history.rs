//! Per-object change ledger.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::prop::{deep_copy_props, Prop, Props};
use crate::reconcile::{reconcile, Reconcilable, Reconciliation};
use crate::trace::Snapshot;

/// Callback fired after a snapshot is appended to a ledger.
pub type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies one deep-watch wiring.
///
/// A ledger keeps at most one listener per token, so wiring the same token
/// twice replaces the first registration instead of adding a second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

impl WatchToken {
    pub fn new() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatchToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct Registration {
    token: Option<WatchToken>,
    listener: Listener,
}

/// The change log of one tracked object.
///
/// Holds a deep copy of the object's properties taken at construction, every
/// snapshot recorded since (append-only, in call order) and the listeners to
/// notify when a snapshot is added.
#[derive(Clone)]
pub struct History {
    initial_props: Props,
    snapshots: Vec<Snapshot>,
    listeners: Vec<Registration>,
}

impl History {
    pub(crate) fn new(props: &Props) -> Self {
        Self {
            initial_props: deep_copy_props(props),
            snapshots: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Properties as they were when the object was constructed.
    pub fn initial_props(&self) -> &Props {
        &self.initial_props
    }

    pub fn initial(&self, key: &str) -> Option<&Prop> {
        self.initial_props.get(key)
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Whether any recorded snapshot touches `path`.
    pub fn has_change(&self, path: &str) -> bool {
        self.snapshots.iter().any(|s| s.has_change(path))
    }

    /// Snapshots recorded for exactly `path`.
    pub fn snapshots_for_path(&self, path: &str) -> Vec<&Snapshot> {
        self.snapshots
            .iter()
            .filter(|s| s.field_path() == path)
            .collect()
    }

    /// Snapshots sharing a path segment with `path`.
    pub fn snapshots_touching(&self, path: &str) -> Vec<&Snapshot> {
        self.snapshots.iter().filter(|s| s.has_change(path)).collect()
    }

    /// Append and notify every listener in registration order.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        for listener in self.record(snapshot.clone()) {
            listener(&snapshot);
        }
    }

    pub fn on_change<F>(&mut self, listener: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.listeners.push(Registration {
            token: None,
            listener: Arc::new(listener),
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Diff two point-in-time collections.
    pub fn resolve<T: Reconcilable + Clone>(initial: &[T], current: &[T]) -> Reconciliation<T> {
        reconcile(initial, current)
    }

    /// Register under `token`, replacing an earlier listener with the same token.
    pub(crate) fn watch(&mut self, token: WatchToken, listener: Listener) {
        match self
            .listeners
            .iter_mut()
            .find(|r| r.token == Some(token))
        {
            Some(existing) => existing.listener = listener,
            None => self.listeners.push(Registration {
                token: Some(token),
                listener,
            }),
        }
    }

    pub(crate) fn unwatch(&mut self, token: WatchToken) {
        self.listeners.retain(|r| r.token != Some(token));
    }

    /// Append without notifying. Returns the listeners the caller must run
    /// once it no longer holds the owning object's lock.
    pub(crate) fn record(&mut self, snapshot: Snapshot) -> Vec<Listener> {
        self.snapshots.push(snapshot);
        self.listeners.iter().map(|r| r.listener.clone()).collect()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("initial_props", &self.initial_props)
            .field("snapshots", &self.snapshots)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
