//! Lead pipeline walkthrough.
//!
//! Builds a `Lead` aggregate holding a `Proposal` with one `Unit`, edits the
//! unit, prints what a persistence adapter would write and dispatches the
//! queued events into an outbox.
//!
//! Run with `RUST_LOG=tessera=debug cargo run -p lead-pipeline-demo` to see
//! the runtime's own tracing.

use std::sync::Arc;

use anyhow::Result;
use tessera::{
    props, Aggregate, DomainEvent, Entity, EntityHooks, EventReplace, FieldValidator, Prop,
    Subscription,
};
use tessera_outbox::Outbox;
use tessera_persistence::{save, ChangeSet, InMemoryRepository, PersistenceError};
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Schema {
    unit: Arc<EntityHooks>,
    proposal: Arc<EntityHooks>,
    lead: Arc<EntityHooks>,
}

impl Schema {
    fn new() -> Self {
        let positive = FieldValidator::new("isPositive", |value| match value.as_f64() {
            Some(n) if n > 0.0 => None,
            _ => Some("must be a positive number".to_string()),
        });

        Self {
            unit: EntityHooks::builder("Unit")
                .with_validator("consumption", positive)
                .build(),
            proposal: EntityHooks::builder("Proposal")
                .with_validator("unit", FieldValidator::tagged("Unit").array_of())
                .with_default("status", "draft")
                .build(),
            lead: EntityHooks::builder("Lead")
                .with_validator("proposals", FieldValidator::tagged("Proposal").array_of())
                .with_on_change(|lead, snapshot| {
                    info!(
                        lead = %lead.id(),
                        path = snapshot.field_path(),
                        origin = %snapshot.instance_tag(),
                        "lead changed"
                    );
                })
                .build(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let schema = Schema::new();

    let lead = Aggregate::create(
        &schema.lead,
        props! { "id" => "L1", "proposals" => Vec::<Prop>::new() },
    )?;
    let proposal = Entity::create(
        &schema.proposal,
        props! { "id" => "P1", "unit" => Vec::<Prop>::new() },
    )?;
    let unit = Entity::create(&schema.unit, props! { "id" => "U1", "consumption" => 1 })?;

    proposal.push("unit", unit.clone())?;
    lead.push("proposals", proposal.clone())?;
    lead.add_event(
        DomainEvent::new(&lead, "ProposalAdded")
            .with_payload(serde_json::json!({ "proposalId": "P1" })),
        EventReplace::ReplaceDuplicated,
    );

    // Relayed to the lead as "proposals.unit.consumption".
    unit.set("consumption", 2)?;

    if let Err(err) = unit.set("consumption", -5) {
        info!(error = %err, "rejected write is still applied, restoring");
        unit.set("consumption", 2)?;
    }

    proposal.subscribe(Subscription::new().on("unit", |resolved, snapshots| {
        if let Some(changes) = resolved.changes() {
            info!(
                create = changes.to_create.len(),
                update = changes.to_update.len(),
                delete = changes.to_delete.len(),
                snapshots = snapshots.len(),
                "proposal units reconciled"
            );
        }
    }))?;

    let changes = ChangeSet::collect_all(&lead)?;
    info!(changes = %serde_json::to_string_pretty(&changes)?, "lead change set");

    let repository = InMemoryRepository::new(move |row: serde_json::Value| match Prop::from(row) {
        Prop::Record(props) => Ok(Aggregate::create(&schema.lead, props)?),
        other => Err(PersistenceError::Mapping {
            target: "Lead".to_string(),
            reason: format!("expected an object, received {}", other.describe()),
        }),
    });
    let outbox = Outbox::new();

    let report = save(&repository, &lead, &outbox).await?;
    info!(outcome = ?report.outcome, published = report.published, "lead saved");

    for record in outbox.pending() {
        info!(
            sequence = record.sequence,
            event = %record.event_name,
            aggregate = %record.aggregate_id,
            payload = %record.payload,
            "outbox record"
        );
    }

    if let Some(row) = repository.row(lead.id()).await {
        info!(row = %row, "stored row");
    }

    Ok(())
}
