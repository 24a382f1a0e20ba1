//! Recorded mutations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::id::Id;
use crate::prop::Prop;

/// Collection mutators recorded in a [`Trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Append,
    RemoveLast,
    RemoveFirst,
    InsertFront,
    Splice,
    Fill,
    Reverse,
    Sort,
    Truncate,
    Extend,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::RemoveLast => "removeLast",
            Self::RemoveFirst => "removeFirst",
            Self::InsertFront => "insertFront",
            Self::Splice => "splice",
            Self::Fill => "fill",
            Self::Reverse => "reverse",
            Self::Sort => "sort",
            Self::Truncate => "truncate",
            Self::Extend => "extend",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One mutation of a tracked object.
///
/// Field writes carry `from`/`to`; collection mutators carry `action` (and
/// `array_index` for splices) instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub timestamp: DateTime<Utc>,
    pub field_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Prop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Prop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_index: Option<usize>,
}

impl Trace {
    /// A field write. `from` is `None` when the field did not exist.
    pub fn write(field_path: impl Into<String>, from: Option<Prop>, to: Prop) -> Self {
        Self {
            timestamp: Utc::now(),
            field_path: field_path.into(),
            from,
            to: Some(to),
            action: None,
            array_index: None,
        }
    }

    /// A collection mutation on the list at `field_path`.
    pub fn action(field_path: impl Into<String>, action: Action, array_index: Option<usize>) -> Self {
        Self {
            timestamp: Utc::now(),
            field_path: field_path.into(),
            from: None,
            to: None,
            action: Some(action),
            array_index,
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.field_path.split('.')
    }
}

/// A [`Trace`] as stored in a history ledger, plus where it was recorded.
///
/// Snapshots relayed by deep watch keep the origin of the object that
/// actually changed while their path is prefixed with the route from the
/// watching root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    trace: Trace,
    instance_tag: String,
    instance_id: Id,
}

impl Snapshot {
    pub(crate) fn new(trace: Trace, instance_tag: impl Into<String>, instance_id: Id) -> Self {
        Self {
            trace,
            instance_tag: instance_tag.into(),
            instance_id,
        }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn field_path(&self) -> &str {
        &self.trace.field_path
    }

    pub fn from(&self) -> Option<&Prop> {
        self.trace.from.as_ref()
    }

    pub fn to(&self) -> Option<&Prop> {
        self.trace.to.as_ref()
    }

    pub fn action(&self) -> Option<Action> {
        self.trace.action
    }

    pub fn array_index(&self) -> Option<usize> {
        self.trace.array_index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.trace.timestamp
    }

    /// Type tag of the object whose ledger recorded this trace.
    pub fn instance_tag(&self) -> &str {
        &self.instance_tag
    }

    pub fn instance_id(&self) -> &Id {
        &self.instance_id
    }

    /// True if `path` is this trace's field path, or shares a dot-segment
    /// with it.
    pub fn has_change(&self, path: &str) -> bool {
        if self.trace.field_path == path {
            return true;
        }
        path.split('.')
            .any(|wanted| self.trace.segments().any(|segment| segment == wanted))
    }

    /// Copy with `prefix.` prepended to the field path.
    pub(crate) fn prefixed(&self, prefix: &str) -> Snapshot {
        let mut copy = self.clone();
        if !prefix.is_empty() {
            copy.trace.field_path = format!("{prefix}.{}", self.trace.field_path);
        }
        copy
    }
}
