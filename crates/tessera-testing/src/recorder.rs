use std::sync::Arc;

use parking_lot::Mutex;
use tessera::{Entity, Snapshot, WatchCallback};

/// One relayed change seen by a [`TraceRecorder`].
#[derive(Debug, Clone)]
pub struct RecordedTrace {
    pub root: String,
    pub snapshot: Snapshot,
}

/// Collects the snapshots a deep watch delivers.
///
/// ```ignore
/// let recorder = TraceRecorder::new();
/// lead.deep_watch_with(WatchToken::new(), recorder.callback());
/// unit.set("consumption", 2)?;
/// assert_eq!(recorder.paths(), ["proposals.unit.consumption"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    seen: Arc<Mutex<Vec<RecordedTrace>>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> WatchCallback {
        let seen = self.seen.clone();
        Arc::new(move |root: &Entity, snapshot: &Snapshot| {
            seen.lock().push(RecordedTrace {
                root: root.hash_code(),
                snapshot: snapshot.clone(),
            });
        })
    }

    pub fn traces(&self) -> Vec<RecordedTrace> {
        self.seen.lock().clone()
    }

    /// Field paths of the recorded snapshots, in arrival order.
    pub fn paths(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .map(|t| t.snapshot.field_path().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
