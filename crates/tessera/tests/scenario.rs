//! The Lead / Proposal / Unit walkthrough end to end.

use tessera::{
    props, reconcile, Action, Aggregate, Entity, EntityHooks, FieldValidator, Prop, Subscription,
};
use tessera_testing::{fixtures, RecordingPublisher, TraceRecorder};

fn entity_ids(items: &[Prop]) -> Vec<String> {
    items
        .iter()
        .filter_map(|p| p.as_entity().map(|e| e.id().to_string()))
        .collect()
}

/// Lead hooks with an on_change hook, so the aggregate deep-watches its tree.
fn watched_lead(recorder: &TraceRecorder) -> Aggregate {
    let callback = recorder.callback();
    let hooks = EntityHooks::builder("Lead")
        .with_validator("proposals", FieldValidator::tagged("Proposal").array_of())
        .with_on_change(move |lead, snapshot| callback(lead, snapshot))
        .build();
    Aggregate::create(&hooks, props! { "id" => "L1", "proposals" => Vec::<Prop>::new() }).unwrap()
}

#[test]
fn each_object_records_its_own_changes() {
    let lead = fixtures::lead("L1").unwrap();
    let proposal = fixtures::proposal("P1").unwrap();
    let unit = fixtures::unit("U1", 1).unwrap();

    proposal.push("unit", unit.clone()).unwrap();
    fixtures::add_proposal(&lead, proposal.clone()).unwrap();
    unit.set("consumption", 2).unwrap();

    let lead_snapshots = lead.snapshots().unwrap();
    assert_eq!(lead_snapshots.len(), 1);
    assert_eq!(lead_snapshots[0].field_path(), "proposals");
    assert_eq!(lead_snapshots[0].action(), Some(Action::Append));

    let proposal_snapshots = proposal.snapshots().unwrap();
    assert_eq!(proposal_snapshots.len(), 1);
    assert_eq!(proposal_snapshots[0].field_path(), "unit");

    let unit_snapshots = unit.snapshots().unwrap();
    assert_eq!(unit_snapshots.len(), 1);
    assert_eq!(unit_snapshots[0].field_path(), "consumption");
    assert_eq!(unit_snapshots[0].from(), Some(&Prop::from(1)));
    assert_eq!(unit_snapshots[0].to(), Some(&Prop::from(2)));
    assert_eq!(unit_snapshots[0].instance_tag(), "Unit");
}

#[test]
fn proposal_units_reconcile_to_a_create() {
    let lead = fixtures::lead("L1").unwrap();
    let proposal = fixtures::proposal("P1").unwrap();
    let unit = fixtures::unit("U1", 1).unwrap();

    proposal.push("unit", unit.clone()).unwrap();
    fixtures::add_proposal(&lead, proposal.clone()).unwrap();
    unit.set("consumption", 2).unwrap();

    let initial = proposal.initial("unit").unwrap().unwrap();
    let current = proposal.get_list("unit").unwrap();
    let changes = reconcile(initial.as_list().unwrap(), &current);
    assert_eq!(entity_ids(&changes.to_create), ["U1"]);
    assert!(changes.to_update.is_empty());
    assert!(changes.to_delete.is_empty());

    let mut created = Vec::new();
    proposal
        .subscribe(Subscription::new().on("unit", |resolved, _| {
            created = entity_ids(&resolved.changes().unwrap().to_create);
        }))
        .unwrap();
    assert_eq!(created, ["U1"]);
}

#[test]
fn aggregate_hook_relays_nested_changes_with_full_paths() {
    let recorder = TraceRecorder::new();
    let lead = watched_lead(&recorder);
    let proposal = fixtures::proposal("P1").unwrap();
    let unit = fixtures::unit("U1", 1).unwrap();

    proposal.push("unit", unit.clone()).unwrap();
    lead.push("proposals", proposal.clone()).unwrap();
    unit.set("consumption", 2).unwrap();
    proposal.set("status", "sent").unwrap();

    assert_eq!(
        recorder.paths(),
        ["proposals", "proposals.unit.consumption", "proposals.status"]
    );
    let relayed = &recorder.traces()[1];
    assert_eq!(relayed.root, lead.hash_code());
    assert_eq!(relayed.snapshot.instance_tag(), "Unit");
    assert_eq!(relayed.snapshot.instance_id().value(), "U1");
}

#[test]
fn children_added_later_are_wired_at_any_depth() {
    let recorder = TraceRecorder::new();
    let lead = watched_lead(&recorder);
    let first = fixtures::proposal("P1").unwrap();
    let second = fixtures::proposal("P2").unwrap();
    let late_unit = fixtures::unit("U9", 3).unwrap();

    lead.push("proposals", first.clone()).unwrap();
    lead.push("proposals", second.clone()).unwrap();
    second.push("unit", late_unit.clone()).unwrap();
    late_unit.set("consumption", 4).unwrap();

    // One relay per change, even though the lead was rewired several times.
    assert_eq!(
        recorder.paths(),
        [
            "proposals",
            "proposals",
            "proposals.unit",
            "proposals.unit.consumption"
        ]
    );
}

#[test]
fn removed_children_no_longer_reach_the_aggregate() {
    let recorder = TraceRecorder::new();
    let lead = watched_lead(&recorder);
    let proposal = fixtures::proposal("P1").unwrap();

    lead.push("proposals", proposal.clone()).unwrap();
    lead.pop("proposals").unwrap();
    proposal.set("status", "withdrawn").unwrap();

    assert_eq!(recorder.paths(), ["proposals", "proposals"]);
}

#[test]
fn invalid_child_write_is_applied_and_reported() {
    let proposal = fixtures::proposal("P1").unwrap();
    let unit = fixtures::unit("U1", 1).unwrap();
    proposal.push("unit", unit.clone()).unwrap();

    let err = unit.set("consumption", -1).unwrap_err();
    assert_eq!(err.field(), Some("consumption"));
    assert_eq!(unit.get("consumption"), Some(Prop::from(-1)));
    assert_eq!(unit.snapshots().unwrap().len(), 1);
}

#[test]
fn untyped_children_fail_list_validation() {
    let proposal = fixtures::proposal("P1").unwrap();
    let stray = Entity::create(&EntityHooks::builder("Stray").build(), props! { "id" => "S1" })
        .unwrap();

    let err = proposal.push("unit", stray).unwrap_err();
    assert_eq!(err.field(), Some("unit"));
}

#[tokio::test]
async fn queued_events_leave_with_dispatch_all() {
    let lead = fixtures::lead("L1").unwrap();
    fixtures::add_proposal(&lead, fixtures::proposal("P1").unwrap()).unwrap();
    fixtures::add_proposal(&lead, fixtures::proposal("P2").unwrap()).unwrap();

    // ReplaceDuplicated keeps only the latest ProposalAdded.
    assert_eq!(lead.event_count(), 1);
    assert_eq!(lead.events()[0].payload()["proposalId"], "P2");

    let publisher = RecordingPublisher::new();
    assert_eq!(lead.dispatch_all(&publisher).await.unwrap(), 1);
    assert_eq!(publisher.names(), ["ProposalAdded"]);
    assert_eq!(lead.event_count(), 0);
}
