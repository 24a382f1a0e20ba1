//! The Lead / Proposal / Unit graph.
//!
//! A `Lead` aggregate holds `proposals`, each `Proposal` holds a `unit`
//! list of `Unit` entities with a positive `consumption`.

use std::sync::{Arc, OnceLock};

use tessera::{
    props, Aggregate, DomainEvent, Entity, EntityHooks, EventReplace, FieldValidator, Prop, Result,
};

pub fn is_positive() -> FieldValidator {
    FieldValidator::new("isPositive", |value| match value.as_f64() {
        Some(n) if n > 0.0 => None,
        _ => Some("must be a positive number".to_string()),
    })
}

pub fn unit_hooks() -> Arc<EntityHooks> {
    static HOOKS: OnceLock<Arc<EntityHooks>> = OnceLock::new();
    HOOKS
        .get_or_init(|| {
            EntityHooks::builder("Unit")
                .with_validator("consumption", is_positive())
                .build()
        })
        .clone()
}

pub fn proposal_hooks() -> Arc<EntityHooks> {
    static HOOKS: OnceLock<Arc<EntityHooks>> = OnceLock::new();
    HOOKS
        .get_or_init(|| {
            EntityHooks::builder("Proposal")
                .with_validator("unit", FieldValidator::tagged("Unit").array_of())
                .with_default("status", "draft")
                .build()
        })
        .clone()
}

pub fn lead_hooks() -> Arc<EntityHooks> {
    static HOOKS: OnceLock<Arc<EntityHooks>> = OnceLock::new();
    HOOKS
        .get_or_init(|| {
            EntityHooks::builder("Lead")
                .with_validator("proposals", FieldValidator::tagged("Proposal").array_of())
                .with_default("status", "open")
                .build()
        })
        .clone()
}

pub fn unit(id: &str, consumption: i64) -> Result<Entity> {
    Entity::create(&unit_hooks(), props! { "id" => id, "consumption" => consumption })
}

pub fn proposal(id: &str) -> Result<Entity> {
    Entity::create(&proposal_hooks(), props! { "id" => id, "unit" => Vec::<Prop>::new() })
}

pub fn lead(id: &str) -> Result<Aggregate> {
    Aggregate::create(&lead_hooks(), props! { "id" => id, "proposals" => Vec::<Prop>::new() })
}

/// Push `proposal` onto the lead and queue a `ProposalAdded` event,
/// replacing an earlier one still pending.
pub fn add_proposal(lead: &Aggregate, proposal: Entity) -> Result<()> {
    let payload = serde_json::json!({ "proposalId": proposal.id().value() });
    lead.push("proposals", proposal)?;
    lead.add_event(
        DomainEvent::new(lead, "ProposalAdded").with_payload(payload),
        EventReplace::ReplaceDuplicated,
    );
    Ok(())
}
