//! Persistence boundary for Tessera.
//!
//! The core never talks to storage. This crate defines the contracts a
//! storage layer implements and the glue that turns tracked changes into
//! writes:
//!
//! - [`Adapter`] converts between domain objects and storage rows
//! - [`Repository`] is the async storage contract
//! - [`ChangeSet`] asks an aggregate what changed, key by key
//! - [`save`] creates or updates an aggregate, then dispatches its events

mod adapter;
mod changes;
mod error;
mod memory;
mod repository;

pub use adapter::Adapter;
pub use changes::{ChangeSet, FieldChanges};
pub use error::PersistenceError;
pub use memory::{InMemoryRepository, RepositoryOp};
pub use repository::{save, Repository, SaveOutcome, SaveReport};
