//! Immutable, identity-less values.

use std::fmt;
use std::sync::Arc;

use crate::error::{DomainError, Result};
use crate::prop::Prop;
use crate::validation::FieldValidator;

/// An immutable wrapper around primitive or structured data.
///
/// Cloning is cheap (the payload is shared). Two value objects are equal
/// when their payloads are structurally equal; the tag is only used for
/// descriptions and validation. Changing a value means building a new one.
#[derive(Clone)]
pub struct ValueObject {
    inner: Arc<ValueInner>,
}

struct ValueInner {
    tag: String,
    value: Prop,
}

impl ValueObject {
    /// Wrap `value` with no hooks.
    ///
    /// Fails with [`DomainError::EntityInsideValue`] if an entity appears
    /// anywhere inside `value`. Nested value objects are fine.
    pub fn new(tag: impl Into<String>, value: impl Into<Prop>) -> Result<Self> {
        let tag = tag.into();
        let value = value.into();
        if value.contains_entity() {
            return Err(DomainError::EntityInsideValue { tag });
        }
        Ok(Self {
            inner: Arc::new(ValueInner { tag, value }),
        })
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn value(&self) -> &Prop {
        &self.inner.value
    }

    /// Field of a record-shaped value.
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.inner.value.as_record().and_then(|fields| fields.get(key))
    }

    /// Plain projection with nested value objects unwrapped.
    pub fn to_primitives(&self) -> serde_json::Value {
        self.inner.value.to_primitive()
    }

    pub fn is_equal(&self, other: &ValueObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.value == other.inner.value
    }
}

impl PartialEq for ValueObject {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl fmt::Debug for ValueObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.inner.tag, self.inner.value)
    }
}

type Transform = Arc<dyn Fn(Prop) -> Prop + Send + Sync>;
type ValueRules = Arc<dyn Fn(&ValueObject) -> Result<()> + Send + Sync>;

enum ValueValidation {
    Whole(FieldValidator),
    Fields(Vec<(String, FieldValidator)>),
}

/// Construction hooks shared by every value object of one type.
pub struct ValueHooks {
    tag: String,
    transform: Option<Transform>,
    validation: Option<ValueValidation>,
    rules: Option<ValueRules>,
}

impl ValueHooks {
    pub fn builder(tag: impl Into<String>) -> ValueHooksBuilder {
        ValueHooksBuilder {
            hooks: ValueHooks {
                tag: tag.into(),
                transform: None,
                validation: None,
                rules: None,
            },
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Build a value object: transform, structure check, validation, rules.
    pub fn create(&self, value: impl Into<Prop>) -> Result<ValueObject> {
        let mut value = value.into();
        if let Some(transform) = &self.transform {
            value = transform(value);
        }

        let object = ValueObject::new(self.tag.clone(), value)?;

        match &self.validation {
            Some(ValueValidation::Whole(validator)) => {
                validator.validate(&self.tag, "value", object.value())?;
            }
            Some(ValueValidation::Fields(validators)) => {
                for (field, validator) in validators {
                    let current = object.get(field).cloned().unwrap_or_default();
                    validator.validate(&self.tag, field, &current)?;
                }
            }
            None => {}
        }

        if let Some(rules) = &self.rules {
            rules(&object)?;
        }

        Ok(object)
    }
}

impl fmt::Debug for ValueHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueHooks")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ValueHooks`].
pub struct ValueHooksBuilder {
    hooks: ValueHooks,
}

impl ValueHooksBuilder {
    /// Rewrite the raw input before anything else runs.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Prop) -> Prop + Send + Sync + 'static,
    {
        self.hooks.transform = Some(Arc::new(transform));
        self
    }

    /// Validate the whole value with one predicate.
    ///
    /// Replaces any per-field validators.
    pub fn with_validator(mut self, validator: FieldValidator) -> Self {
        self.hooks.validation = Some(ValueValidation::Whole(validator));
        self
    }

    /// Validate one field of a record-shaped value.
    ///
    /// Fields are checked in the order they were added.
    pub fn with_field_validator(mut self, field: impl Into<String>, validator: FieldValidator) -> Self {
        let field = field.into();
        match &mut self.hooks.validation {
            Some(ValueValidation::Fields(validators)) => validators.push((field, validator)),
            _ => self.hooks.validation = Some(ValueValidation::Fields(vec![(field, validator)])),
        }
        self
    }

    pub fn with_rules<F>(mut self, rules: F) -> Self
    where
        F: Fn(&ValueObject) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.rules = Some(Arc::new(rules));
        self
    }

    pub fn build(self) -> Arc<ValueHooks> {
        Arc::new(self.hooks)
    }
}
