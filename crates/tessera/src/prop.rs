//! Dynamic values stored in an object's property bag.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::entity::Entity;
use crate::id::Id;
use crate::value_object::ValueObject;

/// A property bag: field name to value, ordered by name.
pub type Props = BTreeMap<String, Prop>;

/// One value held by an entity, aggregate or value object.
///
/// Primitives and value objects are plain data. `Entity` holds a shared
/// handle to a tracked child object, so the parent owns the child and sees
/// its live state.
#[derive(Debug, Clone, Default)]
pub enum Prop {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Id(Id),
    Value(ValueObject),
    Entity(Entity),
    List(Vec<Prop>),
    Record(Props),
}

impl Prop {
    /// Build a nested record from `(field, value)` pairs.
    pub fn record<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Prop>,
    {
        Self::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list from anything convertible into props.
    pub fn list<V: Into<Prop>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueObject> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Prop]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Props> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Tracked objects held directly by this value or as list elements.
    pub fn entities(&self) -> Vec<Entity> {
        match self {
            Self::Entity(e) => vec![e.clone()],
            Self::List(items) => items
                .iter()
                .filter_map(|item| item.as_entity().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether an entity appears anywhere inside this value.
    pub fn contains_entity(&self) -> bool {
        match self {
            Self::Entity(_) => true,
            Self::List(items) => items.iter().any(Prop::contains_entity),
            Self::Record(fields) => fields.values().any(Prop::contains_entity),
            _ => false,
        }
    }

    /// Short description of what kind of value this is, used in errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(_) => "boolean".into(),
            Self::Int(_) | Self::Float(_) => "number".into(),
            Self::Text(_) => "string".into(),
            Self::Timestamp(_) => "timestamp".into(),
            Self::Id(_) => "id".into(),
            Self::Value(v) => v.tag().to_string(),
            Self::Entity(e) => e.type_tag().to_string(),
            Self::List(items) => match items.first() {
                Some(Self::Entity(e)) => format!("ArrayOf<{}>", e.type_tag()),
                Some(Self::Value(v)) => format!("ArrayOf<{}>", v.tag()),
                _ => "Array".into(),
            },
            Self::Record(_) => "Object".into(),
        }
    }

    /// Plain JSON projection, unwrapping value objects and entities.
    pub fn to_primitive(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(n) => Json::from(*n),
            Self::Float(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Self::Text(s) => Json::String(s.clone()),
            Self::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Id(id) => Json::String(id.value().to_string()),
            Self::Value(v) => v.to_primitives(),
            Self::Entity(e) => e.to_primitives(),
            Self::List(items) => Json::Array(items.iter().map(Prop::to_primitive).collect()),
            Self::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_primitive()))
                    .collect(),
            ),
        }
    }

    /// Copy that shares nothing mutable with `self`.
    ///
    /// Entities are copied into detached objects holding their current
    /// state, so later writes to the live entity do not show up in the copy.
    pub(crate) fn deep_copy(&self) -> Prop {
        match self {
            Self::Entity(e) => Self::Entity(e.detached_copy()),
            Self::List(items) => Self::List(items.iter().map(Prop::deep_copy).collect()),
            Self::Record(fields) => Self::Record(deep_copy_props(fields)),
            other => other.clone(),
        }
    }
}

pub(crate) fn deep_copy_props(props: &Props) -> Props {
    props
        .iter()
        .map(|(k, v)| (k.clone(), v.deep_copy()))
        .collect()
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Id(a), Self::Id(b)) => a == b,
            (Self::Value(a), Self::Value(b)) => a.is_equal(b),
            (Self::Entity(a), Self::Entity(b)) => a.is_equal(b),
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Serialize for Prop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_primitive().serialize(serializer)
    }
}

impl From<bool> for Prop {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Prop {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Prop {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for Prop {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Prop {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Prop {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Prop {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for Prop {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Id> for Prop {
    fn from(value: Id) -> Self {
        Self::Id(value)
    }
}

impl From<ValueObject> for Prop {
    fn from(value: ValueObject) -> Self {
        Self::Value(value)
    }
}

impl From<Entity> for Prop {
    fn from(value: Entity) -> Self {
        Self::Entity(value)
    }
}

impl From<Props> for Prop {
    fn from(value: Props) -> Self {
        Self::Record(value)
    }
}

impl<T: Into<Prop>> From<Vec<T>> for Prop {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Prop>> From<Option<T>> for Prop {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<serde_json::Value> for Prop {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            Json::String(s) => Self::Text(s),
            Json::Array(items) => Self::List(items.into_iter().map(Prop::from).collect()),
            Json::Object(fields) => {
                Self::Record(fields.into_iter().map(|(k, v)| (k, Prop::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(Prop::Int(2), Prop::Float(2.0));
        assert_ne!(Prop::Int(2), Prop::Float(2.5));
        assert_ne!(Prop::Int(0), Prop::Null);
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let prop = Prop::from(json!({
            "street": "Main",
            "number": 12,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "extra": null
        }));
        let record = prop.as_record().unwrap();
        assert_eq!(record["street"].as_str(), Some("Main"));
        assert_eq!(record["number"].as_i64(), Some(12));
        assert_eq!(record["ratio"].as_f64(), Some(0.5));
        assert_eq!(record["tags"].as_list().map(<[Prop]>::len), Some(2));
        assert!(record["extra"].is_null());

        assert_eq!(
            prop.to_primitive(),
            json!({
                "extra": null,
                "number": 12,
                "ratio": 0.5,
                "street": "Main",
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn describe_names_primitive_kinds() {
        assert_eq!(Prop::from("x").describe(), "string");
        assert_eq!(Prop::from(1).describe(), "number");
        assert_eq!(Prop::from(true).describe(), "boolean");
        assert_eq!(Prop::Null.describe(), "null");
        assert_eq!(Prop::list(["a"]).describe(), "Array");
        assert_eq!(Prop::record([("a", 1)]).describe(), "Object");
    }

    #[test]
    fn option_and_vec_conversions() {
        assert!(Prop::from(None::<i64>).is_null());
        assert_eq!(Prop::from(Some(3)), Prop::Int(3));
        assert_eq!(
            Prop::from(vec![1, 2]),
            Prop::List(vec![Prop::Int(1), Prop::Int(2)])
        );
    }

    #[test]
    fn nan_projects_to_null() {
        assert_eq!(Prop::Float(f64::NAN).to_primitive(), serde_json::Value::Null);
    }

    #[test]
    fn primitives_never_contain_entities() {
        let prop = Prop::record([("a", Prop::list([1, 2]))]);
        assert!(!prop.contains_entity());
        assert!(prop.entities().is_empty());
    }
}
