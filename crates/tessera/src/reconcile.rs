//! Diffing two point-in-time collections.
//!
//! Given what was loaded (`initial`) and what is there now (`current`),
//! [`reconcile`] works out which elements a persistence adapter must insert,
//! update and delete. Tracked objects are matched by identity first, so an
//! edited entity is an update and never a delete plus a create.

use crate::entity::Entity;
use crate::id::Id;
use crate::prop::Prop;
use crate::value_object::ValueObject;

/// How two elements relate for reconciliation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
    /// Not the same element.
    Distinct,
    /// The same element, unchanged.
    Same,
    /// The same identity, but the state differs.
    Changed,
}

/// Elements that can be reconciled.
pub trait Reconcilable {
    fn matching(&self, other: &Self) -> Matching;
}

impl Reconcilable for Entity {
    fn matching(&self, other: &Self) -> Matching {
        if self.id() != other.id() {
            Matching::Distinct
        } else if self.is_equal(other) {
            Matching::Same
        } else {
            Matching::Changed
        }
    }
}

impl Reconcilable for ValueObject {
    fn matching(&self, other: &Self) -> Matching {
        if self.is_equal(other) {
            Matching::Same
        } else {
            Matching::Distinct
        }
    }
}

impl Reconcilable for Id {
    fn matching(&self, other: &Self) -> Matching {
        if self == other {
            Matching::Same
        } else {
            Matching::Distinct
        }
    }
}

impl Reconcilable for Prop {
    fn matching(&self, other: &Self) -> Matching {
        match (self, other) {
            (Prop::Entity(a), Prop::Entity(b)) => a.matching(b),
            (Prop::Value(a), Prop::Value(b)) => a.matching(b),
            (Prop::Entity(_), _) | (_, Prop::Entity(_)) => Matching::Distinct,
            (a, b) if a == b => Matching::Same,
            _ => Matching::Distinct,
        }
    }
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// Current elements with no counterpart in the initial collection.
    pub to_create: Vec<T>,
    /// Current elements whose identity was present initially but whose state changed.
    pub to_update: Vec<T>,
    /// Initial elements with no counterpart in the current collection.
    pub to_delete: Vec<T>,
}

impl<T> Reconciliation<T> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// Convert every element, keeping the three buckets.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Reconciliation<U> {
        Reconciliation {
            to_create: self.to_create.into_iter().map(&mut f).collect(),
            to_update: self.to_update.into_iter().map(&mut f).collect(),
            to_delete: self.to_delete.into_iter().map(&mut f).collect(),
        }
    }
}

impl<T> Default for Reconciliation<T> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

/// Best match for `element` among `candidates`: an unchanged match wins over
/// a changed one.
fn best_match<T: Reconcilable>(element: &T, candidates: &[T]) -> Matching {
    let mut best = Matching::Distinct;
    for candidate in candidates {
        match element.matching(candidate) {
            Matching::Same => return Matching::Same,
            Matching::Changed => best = Matching::Changed,
            Matching::Distinct => {}
        }
    }
    best
}

/// Split `current` against `initial` into create, update and delete sets.
///
/// Pure and deterministic. Buckets keep input order, and
/// `reconcile(x, x)` is always empty.
pub fn reconcile<T: Reconcilable + Clone>(initial: &[T], current: &[T]) -> Reconciliation<T> {
    let mut result = Reconciliation::default();

    for element in current {
        match best_match(element, initial) {
            Matching::Distinct => result.to_create.push(element.clone()),
            Matching::Changed => result.to_update.push(element.clone()),
            Matching::Same => {}
        }
    }

    for element in initial {
        if best_match(element, current) == Matching::Distinct {
            result.to_delete.push(element.clone());
        }
    }

    result
}
