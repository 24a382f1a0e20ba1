//! Object identity.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of an entity or aggregate.
///
/// Two identities are equal iff their values are equal. The `fresh` flag only
/// records whether the value was generated here (the object has not been
/// persisted yet) and takes no part in equality or hashing.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id {
    value: String,
    #[serde(skip)]
    fresh: bool,
}

impl Id {
    /// Wrap a pre-existing identifier, e.g. one loaded from storage.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            fresh: false,
        }
    }

    /// Generate a fresh identifier for an object that has not been persisted.
    pub fn generate() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            fresh: true,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this identity was generated rather than loaded.
    pub fn is_new(&self) -> bool {
        self.fresh
    }

    /// Same value, marked fresh. Used when duplicating a record.
    pub fn clone_as_new(&self) -> Self {
        Self {
            value: self.value.clone(),
            fresh: true,
        }
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fresh {
            write!(f, "Id({:?}, new)", self.value)
        } else {
            write!(f, "Id({:?})", self.value)
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self::new(value.to_string())
    }
}
