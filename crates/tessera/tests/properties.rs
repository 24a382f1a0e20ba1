//! Ledger, deep-watch, reconciliation and event-queue guarantees.

use tessera::{
    props, reconcile, Aggregate, DomainEvent, Entity, EntityHooks, EventReplace, Matching, Prop,
    Reconcilable, WatchToken,
};
use tessera_testing::{fixtures, RecordingPublisher, TraceRecorder};

fn item(id: &str, qty: i64) -> Entity {
    Entity::create(
        &EntityHooks::builder("Item").build(),
        props! { "id" => id, "qty" => qty },
    )
    .unwrap()
}

fn ids(items: &[Entity]) -> Vec<String> {
    items.iter().map(|e| e.id().to_string()).collect()
}

#[test]
fn every_mutation_appends_one_snapshot_in_order() {
    let order = Entity::create(
        &EntityHooks::builder("Order").build(),
        props! { "id" => "O1", "total" => 0, "lines" => Vec::<Prop>::new() },
    )
    .unwrap();

    let mut expected = Vec::new();
    for round in 0..25 {
        let path = match fastrand::u8(0..4) {
            0 => {
                order.set("total", round).unwrap();
                "total"
            }
            1 => {
                order.push("lines", round).unwrap();
                "lines"
            }
            2 => {
                order.pop("lines").unwrap();
                "lines"
            }
            _ => {
                order.insert_front("lines", round).unwrap();
                "lines"
            }
        };
        expected.push(path);
    }

    let paths: Vec<String> = order
        .snapshots()
        .unwrap()
        .iter()
        .map(|s| s.field_path().to_string())
        .collect();
    assert_eq!(paths, expected);
}

#[test]
fn nested_child_changes_reach_the_root_with_composed_paths() {
    let child = item("I1", 1);
    let root = Entity::create(
        &EntityHooks::builder("Cart").build(),
        props! { "a" => Prop::record([("b", Prop::from(child.clone()))]) },
    )
    .unwrap();

    let recorder = TraceRecorder::new();
    root.deep_watch_with(WatchToken::new(), recorder.callback());
    child.set("qty", 2).unwrap();

    assert_eq!(recorder.paths(), ["a.b.qty"]);
}

fn random_items(prefix: &str) -> Vec<Entity> {
    (0..fastrand::usize(0..8))
        .map(|n| item(&format!("{prefix}{}", fastrand::u8(0..6) + n as u8), fastrand::i64(1..4)))
        .collect()
}

#[test]
fn reconciliation_is_repeatable_and_empty_on_identical_inputs() {
    for _ in 0..50 {
        let initial = random_items("I");
        let current = random_items("I");

        let first = reconcile(&initial, &current);
        let second = reconcile(&initial, &current);
        assert_eq!(ids(&first.to_create), ids(&second.to_create));
        assert_eq!(ids(&first.to_update), ids(&second.to_update));
        assert_eq!(ids(&first.to_delete), ids(&second.to_delete));

        assert!(reconcile(&initial, &initial).is_empty());
    }
}

#[test]
fn same_identity_with_new_values_is_only_an_update() {
    for _ in 0..50 {
        let id = format!("I{}", fastrand::u32(..));
        let before = item(&id, 1);
        let after = item(&id, fastrand::i64(2..100));
        assert_eq!(after.matching(&before), Matching::Changed);

        let changes = reconcile(&[before], &[after]);
        assert_eq!(ids(&changes.to_update), [id.clone()]);
        assert!(changes.to_create.is_empty());
        assert!(changes.to_delete.is_empty());
    }
}

#[test]
fn replacing_add_keeps_only_the_latest_event() {
    let lead = fixtures::lead("L1").unwrap();
    let first = DomainEvent::new(&lead, "Scored").with_payload(serde_json::json!(1));
    let second = DomainEvent::new(&lead, "Scored").with_payload(serde_json::json!(2));

    lead.add_event(first, EventReplace::ReplaceDuplicated);
    lead.add_event(second, EventReplace::ReplaceDuplicated);

    let queued = lead.events_named("Scored");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].payload(), &serde_json::json!(2));
}

#[tokio::test]
async fn dispatch_by_name_leaves_other_events_queued() {
    let lead = fixtures::lead("L1").unwrap();
    let other = fixtures::lead("L2").unwrap();

    lead.raise("X", serde_json::Value::Null);
    lead.raise("Y", serde_json::Value::Null);
    // Queued on L1 but raised for L2.
    lead.add_event(DomainEvent::new(&other, "X"), EventReplace::Keep);

    let publisher = RecordingPublisher::new();
    assert_eq!(lead.dispatch("X", &publisher).await.unwrap(), 1);

    let remaining: Vec<(String, String)> = lead
        .events()
        .iter()
        .map(|e| (e.name().to_string(), e.aggregate_id().to_string()))
        .collect();
    assert_eq!(
        remaining,
        [
            ("Y".to_string(), "L1".to_string()),
            ("X".to_string(), "L2".to_string()),
        ]
    );
}

#[test]
fn aggregates_are_reachable_through_nested_props() {
    let root = fixtures::lead("L1").unwrap();
    let nested = Aggregate::create(
        &fixtures::lead_hooks(),
        props! { "id" => "L2", "proposals" => Vec::<Prop>::new() },
    )
    .unwrap();
    root.set("referral", nested.clone()).unwrap();

    let reachable: Vec<String> = root
        .reachable_aggregates()
        .iter()
        .map(|a| a.id().to_string())
        .collect();
    assert_eq!(reachable, ["L1", "L2"]);
}
