use crate::error::PersistenceError;

/// Converts one representation into another, e.g. a storage row into an
/// aggregate or back.
///
/// Any `Fn(From) -> Result<To, PersistenceError>` is an adapter.
pub trait Adapter<From, To>: Send + Sync {
    fn build(&self, from: From) -> Result<To, PersistenceError>;
}

impl<From, To, F> Adapter<From, To> for F
where
    F: Fn(From) -> Result<To, PersistenceError> + Send + Sync,
{
    fn build(&self, from: From) -> Result<To, PersistenceError> {
        self(from)
    }
}
