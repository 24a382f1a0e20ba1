//! # Tessera
//!
//! A domain-model runtime: identity, mutation tracking, validation and
//! change reconciliation for entities and aggregates, plus the aggregate
//! domain-event queue.
//!
//! ## Core Concepts
//!
//! - [`Entity`] = a tracked object: an [`Id`], a mutable property bag and a
//!   [`History`] of every change made through it
//! - [`Aggregate`] = an entity that also queues [`DomainEvent`]s
//! - [`ValueObject`] = immutable, identity-less data compared structurally
//!
//! Writes only happen through methods on the handle (`set`, `push`,
//! `splice`, ...). Each write records exactly one [`Snapshot`], so a
//! persistence layer can later ask what changed instead of diffing whole
//! object graphs.
//!
//! ## Architecture
//!
//! ```text
//! client code
//!     │
//!     ▼ set() / push() / splice() ...
//! Entity ──► write props ──► History.record(snapshot)
//!                                 │
//!                                 ├─► listeners ──► deep-watch relay ──► root callback
//!                                 │                 ("proposals.unit.consumption")
//!                                 ├─► revalidate field
//!                                 ├─► business rules
//!                                 └─► on_change hook
//!
//! persistence adapter
//!     │
//!     ▼ subscribe(Subscription::new().on("proposals", ..))
//! History.initial_props ─┐
//!                        ├─► reconcile() ──► { to_create, to_update, to_delete }
//! current props ─────────┘
//!
//! Aggregate.dispatch_all(publisher)
//!     │
//!     ├─► drain own queue + every reachable aggregate's queue
//!     └─► publish concurrently ──► Ok(n) | DispatchError { failures }
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Append-only ledgers** - N tracked mutations leave N snapshots, in call order
//! 2. **Identity is immutable** - `props["id"]` always equals the entity's [`Id`]
//! 3. **Identity first** - reconciliation matches tracked objects by id, so an
//!    edited child is an update, never a delete plus a create
//! 4. **Parents own children** - children and relays never hold a parent strongly
//! 5. **No rollback** - a failed post-change validation leaves the write applied
//! 6. **At-most-once dispatch** - events leave the queue before they are published
//!
//! ## Example
//!
//! ```ignore
//! use tessera::{props, Aggregate, Entity, EntityHooks, Subscription};
//!
//! let unit_hooks = EntityHooks::builder("Unit").build();
//! let proposal_hooks = EntityHooks::builder("Proposal").build();
//! let lead_hooks = EntityHooks::builder("Lead").build();
//!
//! let lead = Aggregate::create(&lead_hooks, props! { "id" => "L1", "proposals" => Vec::<Prop>::new() })?;
//! let unit = Entity::create(&unit_hooks, props! { "id" => "U1", "consumption" => 1 })?;
//! let proposal = Entity::create(&proposal_hooks, props! { "id" => "P1", "unit" => Vec::<Prop>::new() })?;
//!
//! proposal.push("unit", unit.clone())?;
//! lead.push("proposals", proposal.clone())?;
//! unit.set("consumption", 2)?;
//!
//! proposal.subscribe(Subscription::new().on("unit", |resolved, _| {
//!     // resolved.changes().to_create == [U1]
//! }))?;
//!
//! lead.raise("LeadUpdated", serde_json::Value::Null);
//! lead.dispatch_all(&publisher).await?;
//! ```
//!
//! ## What This Is Not
//!
//! Tessera is **not**:
//! - A reactive-programming framework
//! - A persistence engine
//! - A durable event log

// Core modules
mod aggregate;
mod entity;
mod error;
mod event;
mod history;
mod hooks;
mod id;
mod macros;
mod prop;
mod reconcile;
mod subscribe;
mod trace;
mod validation;
mod value_object;
mod watch;

// Re-export tracked object types
pub use aggregate::Aggregate;
pub use entity::{Entity, WeakEntity};

// Re-export value types
pub use id::Id;
pub use prop::{Prop, Props};
pub use value_object::{ValueHooks, ValueHooksBuilder, ValueObject};

// Re-export configuration types
pub use hooks::{EntityHooks, EntityHooksBuilder, WatchCallback};
pub use validation::FieldValidator;

// Re-export history types
pub use history::{History, Listener, WatchToken};
pub use subscribe::{Resolved, Subscription};
pub use trace::{Action, Snapshot, Trace};

// Re-export reconciliation
pub use reconcile::{reconcile, Matching, Reconcilable, Reconciliation};

// Re-export event types
pub use event::{AggregateRef, DomainEvent, EventPublisher, EventReplace};

// Re-export error types
pub use error::{DispatchError, DomainError, ErrorCategory, PublishFailure, Result};

// Re-export commonly used external types
pub use async_trait::async_trait;
