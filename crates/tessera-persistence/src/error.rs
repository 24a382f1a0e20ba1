use tessera::{DispatchError, DomainError};

/// Errors raised while loading or saving aggregates.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The domain rejected the data (validation, rules, history misuse).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The storage backend failed.
    #[error("repository operation '{operation}' failed: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A stored row could not be turned back into a domain object.
    #[error("cannot build {target} from stored data: {reason}")]
    Mapping { target: String, reason: String },

    /// The write succeeded but publishing its events failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl PersistenceError {
    pub(crate) fn repository(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Repository { operation, source }
    }
}
