//! Testing utilities for Tessera.
//!
//! - [`RecordingPublisher`] keeps every event it is handed
//! - [`FailingPublisher`] rejects selected events
//! - [`TraceRecorder`] collects deep-watch relays
//! - [`fixtures`] builds the Lead / Proposal / Unit object graph used across tests
//!
//! # Example
//!
//! ```ignore
//! use tessera_testing::{fixtures, RecordingPublisher};
//!
//! let lead = fixtures::lead("L1")?;
//! fixtures::add_proposal(&lead, fixtures::proposal("P1")?)?;
//!
//! let publisher = RecordingPublisher::new();
//! lead.dispatch_all(&publisher).await?;
//! assert_eq!(publisher.names(), ["ProposalAdded"]);
//! ```

pub mod fixtures;
mod publisher;
mod recorder;

pub use publisher::{FailingPublisher, RecordingPublisher};
pub use recorder::{RecordedTrace, TraceRecorder};
