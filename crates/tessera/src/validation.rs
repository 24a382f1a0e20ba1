//! Pluggable field validators.
//!
//! The core never decides what a valid email or price looks like. It only
//! runs the predicates it is given, in declaration order, and turns the first
//! failure into a [`DomainError::Validation`].

use std::fmt;
use std::sync::Arc;

use crate::error::DomainError;
use crate::prop::Prop;

type Check = Arc<dyn Fn(&Prop) -> Option<String> + Send + Sync>;

/// A named predicate over one field value.
///
/// The check returns `None` when the value is acceptable and an error
/// message otherwise. `name` is reported as the `expected` part of the
/// resulting validation error.
#[derive(Clone)]
pub struct FieldValidator {
    name: String,
    check: Check,
}

impl FieldValidator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Prop) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Accepts entities and value objects carrying `tag`.
    pub fn tagged(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let expected = tag.clone();
        Self::new(tag, move |value| {
            let found = match value {
                Prop::Entity(e) => e.type_tag() == expected,
                Prop::Value(v) => v.tag() == expected,
                _ => false,
            };
            (!found).then(|| format!("expected an instance of {expected}"))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &Prop) -> Option<String> {
        (self.check)(value)
    }

    /// Same check, but `Null` is always accepted.
    pub fn nullable(self) -> Self {
        let name = format!("Optional<{}>", self.name);
        let inner = self.check;
        Self::new(name, move |value| {
            if value.is_null() {
                None
            } else {
                inner(value)
            }
        })
    }

    /// Requires a list and applies the check to every element.
    pub fn array_of(self) -> Self {
        let name = format!("ArrayOf<{}>", self.name);
        let inner = self.check;
        Self::new(name, move |value| match value {
            Prop::List(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| inner(item).map(|msg| format!("element {i}: {msg}"))),
            other => Some(format!("expected a list, received {}", other.describe())),
        })
    }

    /// Run the check, shaping a failure into a validation error.
    pub(crate) fn validate(&self, instance: &str, field: &str, value: &Prop) -> Result<(), DomainError> {
        match self.check(value) {
            None => Ok(()),
            Some(message) => Err(DomainError::Validation {
                instance: instance.to_string(),
                field: field.to_string(),
                message,
                received: value.describe(),
                expected: self.name.clone(),
                value: value.to_primitive(),
            }),
        }
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive() -> FieldValidator {
        FieldValidator::new("isPositive", |v| match v.as_f64() {
            Some(n) if n > 0.0 => None,
            _ => Some("must be a positive number".into()),
        })
    }

    #[test]
    fn failure_becomes_validation_error() {
        let err = positive()
            .validate("Unit", "consumption", &Prop::from("lots"))
            .unwrap_err();
        match err {
            DomainError::Validation {
                field,
                received,
                expected,
                ..
            } => {
                assert_eq!(field, "consumption");
                assert_eq!(received, "string");
                assert_eq!(expected, "isPositive");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(positive().validate("Unit", "consumption", &Prop::from(3)).is_ok());
    }

    #[test]
    fn nullable_accepts_null_only_in_addition() {
        let v = positive().nullable();
        assert_eq!(v.name(), "Optional<isPositive>");
        assert!(v.check(&Prop::Null).is_none());
        assert!(v.check(&Prop::from(-1)).is_some());
    }

    #[test]
    fn array_of_checks_every_element() {
        let v = positive().array_of();
        assert_eq!(v.name(), "ArrayOf<isPositive>");
        assert!(v.check(&Prop::list([1, 2])).is_none());
        let msg = v.check(&Prop::list([1, -2])).unwrap();
        assert!(msg.starts_with("element 1"));
        assert!(v.check(&Prop::from(1)).unwrap().contains("number"));
    }

    #[test]
    fn combinators_compose() {
        let v = positive().array_of().nullable();
        assert_eq!(v.name(), "Optional<ArrayOf<isPositive>>");
        assert!(v.check(&Prop::Null).is_none());
        assert!(v.check(&Prop::list([0])).is_some());
    }
}
