//! Macros for building property bags.

/// Build a [`Props`](crate::Props) map from `key => value` pairs.
///
/// Values go through `Prop::from`, so primitives, ids, value objects,
/// entities and vectors of any of those can be used directly.
///
/// # Example
///
/// ```ignore
/// use tessera::{props, Entity};
///
/// let unit = Entity::create(&unit_hooks, props! {
///     "id" => "U1",
///     "consumption" => 1,
/// })?;
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::Props::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::Props::new();
        $(
            props.insert(::std::string::String::from($key), $crate::Prop::from($value));
        )+
        props
    }};
}
