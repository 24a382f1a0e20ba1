//! Per-type configuration for entities and aggregates.

use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::Result;
use crate::prop::{Prop, Props};
use crate::trace::Snapshot;
use crate::validation::FieldValidator;

/// Callback receiving the watching root and a (possibly relayed) snapshot.
pub type WatchCallback = Arc<dyn Fn(&Entity, &Snapshot) + Send + Sync>;

type Rules = Arc<dyn Fn(&Entity) -> Result<()> + Send + Sync>;
type Lifecycle = Arc<dyn Fn(&Entity) + Send + Sync>;
type Transform = Arc<dyn Fn(Props) -> Props + Send + Sync>;

#[derive(Clone)]
enum DefaultValue {
    Constant(Prop),
    Computed(Arc<dyn Fn() -> Prop + Send + Sync>),
}

impl DefaultValue {
    fn produce(&self) -> Prop {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Computed(make) => make(),
        }
    }
}

/// Everything the runtime needs to know about one entity type.
///
/// Built once with [`EntityHooks::builder`] and shared by every instance of
/// the type.
///
/// ```ignore
/// let unit = EntityHooks::builder("Unit")
///     .with_validator("consumption", is_positive())
///     .with_default("consumption", 0)
///     .build();
/// let u1 = Entity::create(&unit, props! { "id" => "U1", "consumption" => 1 })?;
/// ```
pub struct EntityHooks {
    tag: String,
    track_history: bool,
    validators: Vec<(String, FieldValidator)>,
    defaults: Vec<(String, DefaultValue)>,
    transform: Option<Transform>,
    rules: Option<Rules>,
    on_change: Option<WatchCallback>,
    on_create: Option<Lifecycle>,
}

impl EntityHooks {
    pub fn builder(tag: impl Into<String>) -> EntityHooksBuilder {
        EntityHooksBuilder {
            hooks: EntityHooks {
                tag: tag.into(),
                track_history: true,
                validators: Vec::new(),
                defaults: Vec::new(),
                transform: None,
                rules: None,
                on_change: None,
                on_create: None,
            },
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn tracks_history(&self) -> bool {
        self.track_history
    }

    pub(crate) fn validators(&self) -> &[(String, FieldValidator)] {
        &self.validators
    }

    pub(crate) fn rules(&self) -> Option<&Rules> {
        self.rules.as_ref()
    }

    pub(crate) fn on_change(&self) -> Option<&WatchCallback> {
        self.on_change.as_ref()
    }

    pub(crate) fn on_create(&self) -> Option<&Lifecycle> {
        self.on_create.as_ref()
    }

    /// Run the transform, then fill absent or null fields with defaults.
    pub(crate) fn prepare(&self, props: Props) -> Props {
        let mut props = match &self.transform {
            Some(transform) => transform(props),
            None => props,
        };
        for (field, default) in &self.defaults {
            let missing = props.get(field).map_or(true, Prop::is_null);
            if missing {
                props.insert(field.clone(), default.produce());
            }
        }
        props
    }
}

impl fmt::Debug for EntityHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHooks")
            .field("tag", &self.tag)
            .field("track_history", &self.track_history)
            .field(
                "validators",
                &self.validators.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("rules", &self.rules.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityHooks`].
pub struct EntityHooksBuilder {
    hooks: EntityHooks,
}

impl EntityHooksBuilder {
    /// Validate `field` at construction and after every change to it.
    ///
    /// Validators run in the order they were added; the first failure wins.
    pub fn with_validator(mut self, field: impl Into<String>, validator: FieldValidator) -> Self {
        self.hooks.validators.push((field.into(), validator));
        self
    }

    pub fn with_default(mut self, field: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.hooks
            .defaults
            .push((field.into(), DefaultValue::Constant(value.into())));
        self
    }

    /// Default computed per instance, e.g. a fresh timestamp.
    pub fn with_default_with<F>(mut self, field: impl Into<String>, make: F) -> Self
    where
        F: Fn() -> Prop + Send + Sync + 'static,
    {
        self.hooks
            .defaults
            .push((field.into(), DefaultValue::Computed(Arc::new(make))));
        self
    }

    /// Rewrite raw input props before defaults and validation.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Props) -> Props + Send + Sync + 'static,
    {
        self.hooks.transform = Some(Arc::new(transform));
        self
    }

    /// Whole-object business rules, run at construction and after every
    /// tracked change unless suspended by [`Entity::apply_rules_after`].
    pub fn with_rules<F>(mut self, rules: F) -> Self
    where
        F: Fn(&Entity) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.rules = Some(Arc::new(rules));
        self
    }

    /// Called after every tracked change. Aggregates also receive the
    /// changes of every descendant, with relayed paths.
    pub fn with_on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Entity, &Snapshot) + Send + Sync + 'static,
    {
        self.hooks.on_change = Some(Arc::new(callback));
        self
    }

    pub fn with_on_create<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Entity) + Send + Sync + 'static,
    {
        self.hooks.on_create = Some(Arc::new(callback));
        self
    }

    /// Construct instances without a history ledger.
    pub fn without_history(mut self) -> Self {
        self.hooks.track_history = false;
        self
    }

    pub fn build(self) -> Arc<EntityHooks> {
        Arc::new(self.hooks)
    }
}
