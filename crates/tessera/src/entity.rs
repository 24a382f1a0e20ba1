//! Tracked objects and the mutation interceptor.
//!
//! An [`Entity`] is a shared handle to an identity plus a property bag.
//! Every write goes through a method on the handle (`set`, `push`,
//! `splice`, ...) which performs the write, records one [`Snapshot`] in the
//! object's own [`History`] and then runs the post-change lifecycle:
//!
//! ```text
//! set / push / splice ...
//!     │
//!     ▼ write props (under lock)
//! History::record ──► listeners (deep-watch relays, on_change)
//!     │
//!     ├─► revalidate top-level field
//!     ├─► business rules (unless suspended)
//!     └─► hooks.on_change
//! ```
//!
//! A failure in the lifecycle is returned to the caller, but the write and
//! its snapshot stay applied.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Serialize, Serializer};

use crate::aggregate::Aggregate;
use crate::error::{DomainError, Result};
use crate::event::DomainEvent;
use crate::history::{History, Listener, WatchToken};
use crate::hooks::EntityHooks;
use crate::id::Id;
use crate::prop::{deep_copy_props, Prop, Props};
use crate::trace::{Action, Snapshot, Trace};
use crate::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Entity,
    Aggregate,
}

pub(crate) struct Shared {
    hooks: Arc<EntityHooks>,
    kind: Kind,
    id: Id,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    hook_token: WatchToken,
    rules_suspended: AtomicUsize,
    state: Mutex<State>,
}

pub(crate) struct State {
    pub(crate) props: Props,
    pub(crate) history: Option<History>,
    pub(crate) events: Vec<DomainEvent>,
    /// Descendants wired per deep-watch token rooted here.
    pub(crate) watched: HashMap<WatchToken, Vec<WeakEntity>>,
}

/// Shared handle to a tracked object.
///
/// Cloning the handle does not copy the object; use [`Entity::clone_entity`]
/// for that. Handles compare structurally (identity plus properties).
#[derive(Clone)]
pub struct Entity {
    shared: Arc<Shared>,
}

/// Non-owning handle, see [`Entity::downgrade`].
#[derive(Clone)]
pub struct WeakEntity {
    shared: Weak<Shared>,
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.shared.upgrade().map(|shared| Entity { shared })
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(entity) => write!(f, "WeakEntity({})", entity.hash_code()),
            None => f.write_str("WeakEntity(<dropped>)"),
        }
    }
}

impl Entity {
    /// Construct a tracked entity.
    ///
    /// Runs the transform and defaults from `hooks`, assigns the identity
    /// (`props["id"]` as given, or a freshly generated one), lifts
    /// `createdAt`/`updatedAt` out of the bag, captures the initial state,
    /// then validates every field and runs the business rules.
    pub fn create(hooks: &Arc<EntityHooks>, props: Props) -> Result<Self> {
        Self::construct(hooks, props, Kind::Entity)
    }

    pub(crate) fn construct(hooks: &Arc<EntityHooks>, props: Props, kind: Kind) -> Result<Self> {
        Self::assemble(hooks, hooks.prepare(props), kind)
    }

    fn assemble(hooks: &Arc<EntityHooks>, mut props: Props, kind: Kind) -> Result<Self> {
        let id = match props.remove("id") {
            Some(Prop::Id(id)) => id,
            Some(Prop::Text(value)) => Id::new(value),
            Some(Prop::Int(value)) => Id::new(value.to_string()),
            _ => Id::generate(),
        };
        props.insert("id".to_string(), Prop::Id(id.clone()));

        let created_at =
            take_timestamp(&mut props, "createdAt").or_else(|| id.is_new().then(Utc::now));
        let updated_at = take_timestamp(&mut props, "updatedAt");
        let history = hooks.tracks_history().then(|| History::new(&props));

        let entity = Self {
            shared: Arc::new(Shared {
                hooks: hooks.clone(),
                kind,
                id,
                created_at,
                updated_at,
                hook_token: WatchToken::new(),
                rules_suspended: AtomicUsize::new(0),
                state: Mutex::new(State {
                    props,
                    history,
                    events: Vec::new(),
                    watched: HashMap::new(),
                }),
            }),
        };

        entity.revalidate(None)?;
        entity.ensure_business_rules()?;

        if kind == Kind::Aggregate {
            if let Some(callback) = hooks.on_change() {
                watch::wire(&entity, entity.shared.hook_token, callback.clone());
            }
        }
        if let Some(on_create) = hooks.on_create() {
            on_create(&entity);
        }

        Ok(entity)
    }

    /// Untracked copy of the current state, used for initial snapshots.
    pub(crate) fn detached_copy(&self) -> Entity {
        let props = self.props();
        Entity {
            shared: Arc::new(Shared {
                hooks: self.shared.hooks.clone(),
                kind: self.shared.kind,
                id: self.shared.id.clone(),
                created_at: self.shared.created_at,
                updated_at: self.shared.updated_at,
                hook_token: WatchToken::new(),
                rules_suspended: AtomicUsize::new(0),
                state: Mutex::new(State {
                    props: deep_copy_props(&props),
                    history: None,
                    events: Vec::new(),
                    watched: HashMap::new(),
                }),
            }),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock()
    }

    pub fn id(&self) -> &Id {
        &self.shared.id
    }

    pub fn type_tag(&self) -> &str {
        self.shared.hooks.tag()
    }

    pub fn hooks(&self) -> &Arc<EntityHooks> {
        &self.shared.hooks
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.shared.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.shared.updated_at
    }

    /// Whether the identity was generated here rather than loaded.
    pub fn is_new(&self) -> bool {
        self.shared.id.is_new()
    }

    pub fn is_aggregate(&self) -> bool {
        self.shared.kind == Kind::Aggregate
    }

    pub fn as_aggregate(&self) -> Option<Aggregate> {
        self.is_aggregate()
            .then(|| Aggregate::from_entity(self.clone()))
    }

    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// `[Entity@Tag]:id` or `[Aggregate@Tag]:id`.
    pub fn hash_code(&self) -> String {
        let kind = match self.shared.kind {
            Kind::Entity => "Entity",
            Kind::Aggregate => "Aggregate",
        };
        format!("[{kind}@{}]:{}", self.type_tag(), self.shared.id)
    }

    // --- reads ---

    /// Value at a dotted path.
    ///
    /// Paths descend through records, value objects, child entities and
    /// list indices (`"proposals.0.unit"`).
    pub fn get(&self, path: &str) -> Option<Prop> {
        let (head, rest) = split_first(path);
        let value = self.lock().props.get(head).cloned()?;
        match rest {
            None => Some(value),
            Some(rest) => descend(&value, rest),
        }
    }

    pub fn get_list(&self, path: &str) -> Option<Vec<Prop>> {
        match self.get(path)? {
            Prop::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_entity(&self, path: &str) -> Option<Entity> {
        match self.get(path)? {
            Prop::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Entities held at `path`, either directly or as list elements.
    pub fn get_entities(&self, path: &str) -> Vec<Entity> {
        self.get(path).map(|p| p.entities()).unwrap_or_default()
    }

    /// Copy of the whole property bag (child entities stay shared).
    pub fn props(&self) -> Props {
        self.lock().props.clone()
    }

    // --- writes ---

    /// Write a field. Dotted paths write into existing nested records.
    pub fn set(&self, path: &str, value: impl Into<Prop>) -> Result<()> {
        if path == "id" {
            return Err(DomainError::ImmutableField {
                instance: self.hash_code(),
                field: path.to_string(),
            });
        }
        if path.split('.').any(str::is_empty) {
            return Err(self.invalid_path(path, "a field"));
        }

        let value = value.into();
        let previous = {
            let mut state = self.lock();
            let (parent, field) = parent_record(&mut state.props, path)
                .ok_or_else(|| self.invalid_path(path, "a nested record"))?;
            parent.insert(field.to_string(), value.clone())
        };
        self.commit(Trace::write(path, previous, value))
    }

    pub fn push(&self, path: &str, item: impl Into<Prop>) -> Result<()> {
        let item = item.into();
        self.mutate_list(path, Action::Append, None, |items| {
            items.push(item);
            Ok(())
        })
    }

    pub fn pop(&self, path: &str) -> Result<Option<Prop>> {
        self.mutate_list(path, Action::RemoveLast, None, |items| Ok(items.pop()))
    }

    pub fn remove_first(&self, path: &str) -> Result<Option<Prop>> {
        self.mutate_list(path, Action::RemoveFirst, None, |items| {
            Ok((!items.is_empty()).then(|| items.remove(0)))
        })
    }

    pub fn insert_front(&self, path: &str, item: impl Into<Prop>) -> Result<()> {
        let item = item.into();
        self.mutate_list(path, Action::InsertFront, None, |items| {
            items.insert(0, item);
            Ok(())
        })
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    ///
    /// Out-of-range bounds are clamped. Returns the removed elements.
    pub fn splice(
        &self,
        path: &str,
        start: usize,
        delete_count: usize,
        items: Vec<Prop>,
    ) -> Result<Vec<Prop>> {
        self.mutate_list(path, Action::Splice, Some(start), |list| {
            let start = start.min(list.len());
            let end = start.saturating_add(delete_count).min(list.len());
            Ok(list.splice(start..end, items).collect())
        })
    }

    /// Replace the element at `index`, returning the old one.
    pub fn replace_at(&self, path: &str, index: usize, item: impl Into<Prop>) -> Result<Prop> {
        let item = item.into();
        self.mutate_list(path, Action::Splice, Some(index), |list| {
            let slot = list
                .get_mut(index)
                .ok_or_else(|| self.invalid_path(path, "an existing list index"))?;
            Ok(std::mem::replace(slot, item))
        })
    }

    pub fn remove_at(&self, path: &str, index: usize) -> Result<Prop> {
        self.mutate_list(path, Action::Splice, Some(index), |list| {
            if index < list.len() {
                Ok(list.remove(index))
            } else {
                Err(self.invalid_path(path, "an existing list index"))
            }
        })
    }

    pub fn fill(&self, path: &str, value: impl Into<Prop>) -> Result<()> {
        let value = value.into();
        self.mutate_list(path, Action::Fill, None, |items| {
            items.iter_mut().for_each(|slot| *slot = value.clone());
            Ok(())
        })
    }

    pub fn reverse(&self, path: &str) -> Result<()> {
        self.mutate_list(path, Action::Reverse, None, |items| {
            items.reverse();
            Ok(())
        })
    }

    /// Sort the list at `path`. The comparator runs without the object lock
    /// held, so it may read other fields.
    pub fn sort_by<F>(&self, path: &str, compare: F) -> Result<()>
    where
        F: FnMut(&Prop, &Prop) -> CmpOrdering,
    {
        let mut sorted = {
            let mut state = self.lock();
            list_at(&mut state.props, path)
                .ok_or_else(|| self.invalid_path(path, "a list"))?
                .clone()
        };
        sorted.sort_by(compare);
        self.mutate_list(path, Action::Sort, None, |items| {
            *items = sorted;
            Ok(())
        })
    }

    pub fn truncate(&self, path: &str, len: usize) -> Result<()> {
        self.mutate_list(path, Action::Truncate, None, |items| {
            items.truncate(len);
            Ok(())
        })
    }

    pub fn extend<I, V>(&self, path: &str, items: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Prop>,
    {
        let items: Vec<Prop> = items.into_iter().map(Into::into).collect();
        self.mutate_list(path, Action::Extend, None, |list| {
            list.extend(items);
            Ok(())
        })
    }

    fn mutate_list<R>(
        &self,
        path: &str,
        action: Action,
        index: Option<usize>,
        apply: impl FnOnce(&mut Vec<Prop>) -> Result<R>,
    ) -> Result<R> {
        let output = {
            let mut state = self.lock();
            let items = list_at(&mut state.props, path)
                .ok_or_else(|| self.invalid_path(path, "a list"))?;
            apply(items)?
        };
        self.commit(Trace::action(path, action, index))?;
        Ok(output)
    }

    /// Record `trace` and run the post-change lifecycle.
    fn commit(&self, trace: Trace) -> Result<()> {
        let recorded = {
            let mut state = self.lock();
            match state.history.as_mut() {
                None => None,
                Some(history) => {
                    let snapshot = Snapshot::new(trace, self.type_tag(), self.shared.id.clone());
                    let listeners = history.record(snapshot.clone());
                    Some((snapshot, listeners))
                }
            }
        };
        let Some((snapshot, listeners)) = recorded else {
            return Ok(());
        };

        tracing::trace!(
            entity = %self.hash_code(),
            path = snapshot.field_path(),
            action = ?snapshot.action(),
            "recorded snapshot"
        );

        for listener in listeners {
            listener(&snapshot);
        }

        let field = split_first(snapshot.field_path()).0;
        self.revalidate(Some(field))?;
        if !self.rules_suspended() {
            self.ensure_business_rules()?;
        }
        if let Some(callback) = self.shared.hooks.on_change() {
            callback(self, &snapshot);
        }
        Ok(())
    }

    // --- validation ---

    /// Run field validators, all of them or only those under `field`.
    pub fn revalidate(&self, field: Option<&str>) -> Result<()> {
        let instance = self.hash_code();
        for (name, validator) in self.shared.hooks.validators() {
            if field.is_some_and(|f| split_first(name).0 != f) {
                continue;
            }
            let value = self.get(name).unwrap_or_default();
            validator.validate(&instance, name, &value)?;
        }
        Ok(())
    }

    pub fn ensure_business_rules(&self) -> Result<()> {
        match self.shared.hooks.rules() {
            Some(rules) => rules(self),
            None => Ok(()),
        }
    }

    /// Run `f` with business rules suspended, then run them once.
    ///
    /// Rules run even when `f` fails; the error from `f` takes precedence.
    /// Nested calls only run the rules when the outermost one finishes.
    pub fn apply_rules_after<R>(&self, f: impl FnOnce(&Entity) -> Result<R>) -> Result<R> {
        let result = {
            let _suspended = RulesSuspended::new(&self.shared);
            f(self)
        };
        let rules = if self.rules_suspended() {
            Ok(())
        } else {
            self.ensure_business_rules()
        };
        let value = result?;
        rules?;
        Ok(value)
    }

    fn rules_suspended(&self) -> bool {
        self.shared.rules_suspended.load(Ordering::Acquire) > 0
    }

    // --- history ---

    pub fn has_history(&self) -> bool {
        self.lock().history.is_some()
    }

    /// Copy of the ledger.
    pub fn history(&self) -> Result<History> {
        self.lock()
            .history
            .clone()
            .ok_or_else(|| self.history_disabled())
    }

    pub fn has_change(&self, path: &str) -> Result<bool> {
        self.lock()
            .history
            .as_ref()
            .map(|h| h.has_change(path))
            .ok_or_else(|| self.history_disabled())
    }

    pub fn snapshots(&self) -> Result<Vec<Snapshot>> {
        self.lock()
            .history
            .as_ref()
            .map(|h| h.snapshots().to_vec())
            .ok_or_else(|| self.history_disabled())
    }

    /// Value of `key` at construction time.
    pub fn initial(&self, key: &str) -> Result<Option<Prop>> {
        self.lock()
            .history
            .as_ref()
            .map(|h| h.initial(key).cloned())
            .ok_or_else(|| self.history_disabled())
    }

    /// Listen to snapshots recorded in this object's own ledger.
    pub fn on_change<F>(&self, listener: F) -> Result<()>
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        match self.lock().history.as_mut() {
            Some(history) => {
                history.on_change(listener);
                Ok(())
            }
            None => Err(self.history_disabled()),
        }
    }

    /// Register a keyed listener; false if this object keeps no history.
    pub(crate) fn watch_ledger(&self, token: WatchToken, listener: Listener) -> bool {
        match self.lock().history.as_mut() {
            Some(history) => {
                history.watch(token, listener);
                true
            }
            None => false,
        }
    }

    pub(crate) fn unwatch_ledger(&self, token: WatchToken) {
        if let Some(history) = self.lock().history.as_mut() {
            history.unwatch(token);
        }
    }

    /// Remember what `token` reaches from here. Returns the live descendants
    /// it reached before but no longer does.
    pub(crate) fn replace_watched(&self, token: WatchToken, reached: &[Entity]) -> Vec<Entity> {
        let previous = self
            .lock()
            .watched
            .insert(token, reached.iter().map(Entity::downgrade).collect())
            .unwrap_or_default();
        previous
            .iter()
            .filter_map(WeakEntity::upgrade)
            .filter(|old| !reached.iter().any(|r| r.ptr_eq(old)))
            .collect()
    }

    // --- comparison and export ---

    /// Same identity and structurally equal properties.
    ///
    /// Timestamps take no part in the comparison: neither `createdAt`/
    /// `updatedAt` nor any timestamp-valued field in the bag.
    pub fn is_equal(&self, other: &Entity) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.id() != other.id() {
            return false;
        }
        without_timestamps(self.props()) == without_timestamps(other.props())
    }

    /// Tracked copy with the same identity and a fresh ledger.
    ///
    /// Child entities are cloned the same way. The copy is validated and
    /// `on_create` runs again; the transform does not.
    pub fn clone_entity(&self) -> Result<Entity> {
        let mut props = clone_props(&self.props())?;
        props.insert("id".to_string(), Prop::Id(self.id().clone()));
        if let Some(at) = self.created_at() {
            props.insert("createdAt".to_string(), Prop::Timestamp(at));
        }
        if let Some(at) = self.updated_at() {
            props.insert("updatedAt".to_string(), Prop::Timestamp(at));
        }
        Self::assemble(&self.shared.hooks, props, self.shared.kind)
    }

    /// Plain JSON projection: every prop unwrapped, plus `createdAt` and
    /// `updatedAt`.
    pub fn to_primitives(&self) -> serde_json::Value {
        let mut out: serde_json::Map<String, serde_json::Value> = self
            .props()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_primitive()))
            .collect();
        out.insert(
            "createdAt".to_string(),
            Prop::from(self.created_at()).to_primitive(),
        );
        out.insert(
            "updatedAt".to_string(),
            Prop::from(self.updated_at()).to_primitive(),
        );
        serde_json::Value::Object(out)
    }

    pub(crate) fn invalid_path(&self, path: &str, expected: &'static str) -> DomainError {
        DomainError::InvalidPath {
            instance: self.hash_code(),
            path: path.to_string(),
            expected,
        }
    }

    pub(crate) fn history_disabled(&self) -> DomainError {
        DomainError::HistoryDisabled {
            instance: self.hash_code(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entity").field(&self.hash_code()).finish()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_primitives().serialize(serializer)
    }
}

struct RulesSuspended<'a>(&'a Shared);

impl<'a> RulesSuspended<'a> {
    fn new(shared: &'a Shared) -> Self {
        shared.rules_suspended.fetch_add(1, Ordering::AcqRel);
        Self(shared)
    }
}

impl Drop for RulesSuspended<'_> {
    fn drop(&mut self) {
        self.0.rules_suspended.fetch_sub(1, Ordering::AcqRel);
    }
}

fn take_timestamp(props: &mut Props, key: &str) -> Option<DateTime<Utc>> {
    match props.remove(key)? {
        Prop::Timestamp(at) => Some(at),
        Prop::Text(raw) => DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        _ => None,
    }
}

fn without_timestamps(mut props: Props) -> Props {
    props.retain(|_, value| !matches!(value, Prop::Timestamp(_)));
    props
}

fn clone_props(props: &Props) -> Result<Props> {
    props
        .iter()
        .map(|(k, v)| Ok((k.clone(), clone_prop(v)?)))
        .collect()
}

fn clone_prop(value: &Prop) -> Result<Prop> {
    Ok(match value {
        Prop::Entity(entity) => Prop::Entity(entity.clone_entity()?),
        Prop::List(items) => Prop::List(items.iter().map(clone_prop).collect::<Result<_>>()?),
        Prop::Record(fields) => Prop::Record(clone_props(fields)?),
        other => other.clone(),
    })
}

pub(crate) fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Look up a dotted path in a property bag.
pub(crate) fn lookup(props: &Props, path: &str) -> Option<Prop> {
    let (head, rest) = split_first(path);
    let value = props.get(head)?;
    match rest {
        None => Some(value.clone()),
        Some(rest) => descend(value, rest),
    }
}

fn descend(value: &Prop, path: &str) -> Option<Prop> {
    match value {
        Prop::Record(fields) => lookup(fields, path),
        Prop::Value(inner) => inner.value().as_record().and_then(|f| lookup(f, path)),
        Prop::Entity(entity) => entity.get(path),
        Prop::List(items) => {
            let (head, rest) = split_first(path);
            let item = items.get(head.parse::<usize>().ok()?)?;
            match rest {
                None => Some(item.clone()),
                Some(rest) => descend(item, rest),
            }
        }
        _ => None,
    }
}

/// Record holding the last segment of `path`, plus that segment.
fn parent_record<'p, 'k>(props: &'p mut Props, path: &'k str) -> Option<(&'p mut Props, &'k str)> {
    let (parents, field) = match path.rsplit_once('.') {
        Some((parents, field)) => (Some(parents), field),
        None => (None, path),
    };
    let mut current = props;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        current = match current.get_mut(segment) {
            Some(Prop::Record(fields)) => fields,
            _ => return None,
        };
    }
    Some((current, field))
}

fn list_at<'p>(props: &'p mut Props, path: &str) -> Option<&'p mut Vec<Prop>> {
    let (parent, field) = parent_record(props, path)?;
    match parent.get_mut(field) {
        Some(Prop::List(items)) => Some(items),
        _ => None,
    }
}
