//! End-to-end tests for change notification: pruning, ordering, payload
//! protocols and full-text refresh.

mod common;

use std::sync::Arc;

use catalog_mutation::model::{GlossaryTerm, Relationship, ENTITY_TEXT_KEY};
use catalog_mutation::notify::RelationshipOperation;
use catalog_mutation::{
    ChangeNotifier, CoreConfig, EntityHeader, Error, GraphStore, Guid, ListenerProtocol,
    MutationBatch, PropagateTags, Status, Value,
};
use common::{guid, Catalog, Recorder, LINEAGE};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn header(catalog: &Catalog, g: Guid) -> EntityHeader {
    let node = catalog.node(g).unwrap();
    EntityHeader::new(g, node.type_name).with_status(node.status)
}

fn notifier<'a>(catalog: &'a Catalog, listener: &Arc<Recorder>) -> ChangeNotifier<'a> {
    ChangeNotifier::new(&catalog.graph, &catalog.registry, &catalog.config)
        .with_listener(listener.clone())
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_dispatch_order_and_propagation_events() {
    let catalog = Catalog::new();
    for n in 1..=6 {
        catalog.named(n, "Table", &format!("t{n}"));
    }
    let pii = catalog.classify(guid(5), 50, "PII");
    let edge = catalog.relate(guid(5), guid(6), 100, LINEAGE);
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);

    let mut uow = catalog.uow();
    catalog
        .propagation()
        .add_tag_propagation(&mut uow, &edge, PropagateTags::OneToTwo)
        .unwrap();
    assert!(catalog.has_propagated(guid(6), pii.id));

    let batch = MutationBatch {
        created: vec![header(&catalog, guid(1))],
        updated: vec![header(&catalog, guid(2)), header(&catalog, guid(1))],
        partially_updated: vec![header(&catalog, guid(3)), header(&catalog, guid(2))],
        deleted: vec![EntityHeader::new(guid(4), "Table").with_status(Status::Deleted)],
    };
    notifier.on_entities_mutated(&mut uow, batch, false).unwrap();

    assert_eq!(
        listener.events(),
        vec![
            "added:1".to_string(),
            "updated:2".to_string(),
            "updated:3".to_string(),
            "deleted:4".to_string(),
            "classifications_added:6".to_string(),
        ]
    );
}

#[test]
fn test_propagation_events_skip_deleted_entities() {
    let catalog = Catalog::new();
    catalog.entity(1, "Table");
    catalog.entity(2, "Table");
    let pii = catalog.classify(guid(1), 50, "PII");
    let edge = catalog.relate(guid(1), guid(2), 100, LINEAGE);
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);

    let mut uow = catalog.uow();
    catalog
        .propagation()
        .add_tag_propagation(&mut uow, &edge, PropagateTags::OneToTwo)
        .unwrap();
    catalog.deletion().delete_entities(&mut uow, [guid(2)]).unwrap();
    assert_eq!(uow.added_propagations()[&guid(2)][0].type_name, "PII");
    assert_eq!(catalog.node(pii.id).unwrap().status, Status::Active);

    let batch = MutationBatch::from_unit(&uow);
    notifier.on_entities_mutated(&mut uow, batch, false).unwrap();

    assert_eq!(listener.events(), vec!["deleted:2".to_string()]);
}

#[test]
fn test_removed_propagations_reported_after_additions() {
    let catalog = Catalog::new();
    catalog.entity(1, "Table");
    catalog.entity(2, "Table");
    catalog.classify(guid(1), 50, "PII");
    let edge = catalog.relate(guid(1), guid(2), 100, LINEAGE);
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);

    let mut uow = catalog.uow();
    catalog
        .propagation()
        .add_tag_propagation(&mut uow, &edge, PropagateTags::OneToTwo)
        .unwrap();
    catalog.deletion().delete_relationship(&mut uow, &edge).unwrap();

    notifier.notify_propagated_entities(&mut uow).unwrap();

    let expected =
        vec!["classifications_added:2".to_string(), "classifications_deleted:2".to_string()];
    assert_eq!(listener.events(), expected);

    // Ledgers are drained: a second pass reports nothing
    assert!(uow.added_propagations().is_empty());
    assert!(uow.removed_propagations().is_empty());
    notifier.notify_propagated_entities(&mut uow).unwrap();
    assert_eq!(listener.events(), expected);
}

// ============================================================================
// Protocols
// ============================================================================

#[test]
fn test_legacy_failure_names_listener_and_operation() {
    let catalog = Catalog::new();
    catalog.entity(1, "Table");
    let listener = Arc::new(Recorder::failing_on("added"));
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();

    let batch = MutationBatch { created: vec![header(&catalog, guid(1))], ..MutationBatch::new() };
    let err = notifier.on_entities_mutated(&mut uow, batch, false).unwrap_err();

    match err {
        Error::NotificationFailed { listener, operation, source } => {
            assert_eq!(listener, "Recorder");
            assert_eq!(operation, "CREATE");
            assert_eq!(source.to_string(), "added rejected");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_typed_failure_propagates_unwrapped() {
    let config = CoreConfig { listener_protocol: ListenerProtocol::Typed, ..CoreConfig::default() };
    let catalog = Catalog::with_config(config);
    catalog.entity(1, "Table");
    let listener = Arc::new(Recorder::failing_on("updated"));
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();

    let batch = MutationBatch { updated: vec![header(&catalog, guid(1))], ..MutationBatch::new() };
    let err = notifier.on_entities_mutated(&mut uow, batch, false).unwrap_err();

    assert!(matches!(err, Error::Listener(_)));
    // The typed payload was read through the unit's entity cache
    assert!(uow.cached_entity(guid(1)).is_some());
}

#[test]
fn test_relationship_notifications_by_protocol() {
    let relationship = Relationship {
        guid: guid(100),
        type_name: LINEAGE.to_string(),
        end1: guid(1),
        end2: guid(2),
        status: Status::Active,
        propagate_tags: PropagateTags::OneToTwo,
    };

    let legacy = Catalog::new();
    let listener = Arc::new(Recorder::default());
    notifier(&legacy, &listener)
        .notify_relationship_mutation(&relationship, RelationshipOperation::Create)
        .unwrap();
    assert!(listener.events().is_empty());

    let typed = Catalog::with_config(CoreConfig {
        listener_protocol: ListenerProtocol::Typed,
        ..CoreConfig::default()
    });
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&typed, &listener);
    notifier
        .notify_relationship_mutation(&relationship, RelationshipOperation::Create)
        .unwrap();
    notifier
        .notify_relationship_mutation(&relationship, RelationshipOperation::Delete)
        .unwrap();
    assert_eq!(
        listener.events(),
        vec!["relationships_added:100".to_string(), "relationships_deleted:100".to_string()]
    );
}

#[test]
fn test_term_added_reports_entities() {
    let catalog = Catalog::new();
    catalog.entity(1, "Table");
    catalog.entity(2, "Table");
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();
    let term = GlossaryTerm {
        guid: guid(70),
        qualified_name: "pii@glossary".into(),
        name: "pii".into(),
    };

    notifier.on_term_added(&mut uow, &term, &[guid(1), guid(2), guid(3)]).unwrap();

    // Unknown guid 3 is dropped
    assert_eq!(listener.events(), vec!["term_added:70,1,2".to_string()]);
}

// ============================================================================
// Full-text mapping
// ============================================================================

#[test]
fn test_entity_text_refreshed_before_listeners() {
    let catalog = Catalog::new();
    catalog.named(1, "Table", "orders");
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();

    let batch = MutationBatch { created: vec![header(&catalog, guid(1))], ..MutationBatch::new() };
    notifier.on_entities_mutated(&mut uow, batch, false).unwrap();

    assert_eq!(
        catalog.graph.get_property(guid(1), ENTITY_TEXT_KEY).unwrap(),
        Some(Value::from("Table orders"))
    );
}

#[test]
fn test_legacy_classification_add_appends_text() {
    let catalog = Catalog::new();
    catalog.named(1, "Table", "orders");
    catalog
        .graph
        .set_property(guid(1), ENTITY_TEXT_KEY, Value::from("Table orders"))
        .unwrap();
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();

    let entity = catalog_mutation::Entity::from_header(&header(&catalog, guid(1)));
    let classification = catalog_mutation::Classification {
        type_name: "PII".into(),
        entity_guid: guid(1),
        entity_status: Status::Active,
        propagate: true,
        remove_propagations: true,
        attributes: Default::default(),
    };
    notifier.on_classifications_added(&mut uow, &entity, &[classification]).unwrap();

    assert_eq!(
        catalog.graph.get_property(guid(1), ENTITY_TEXT_KEY).unwrap(),
        Some(Value::from("Table orders PII"))
    );
    assert_eq!(listener.events(), vec!["classifications_added:1".to_string()]);
}

#[test]
fn test_full_text_disabled_leaves_text_alone() {
    let catalog =
        Catalog::with_config(CoreConfig { full_text_enabled: false, ..CoreConfig::default() });
    catalog.named(1, "Table", "orders");
    let listener = Arc::new(Recorder::default());
    let notifier = notifier(&catalog, &listener);
    let mut uow = catalog.uow();

    let batch = MutationBatch { created: vec![header(&catalog, guid(1))], ..MutationBatch::new() };
    notifier.on_entities_mutated(&mut uow, batch, false).unwrap();

    assert!(catalog.graph.get_property(guid(1), ENTITY_TEXT_KEY).unwrap().is_none());
    assert_eq!(listener.events(), vec!["added:1".to_string()]);
}

// ============================================================================
// Pruning law
// ============================================================================

fn headers_strategy() -> impl Strategy<Value = Vec<EntityHeader>> {
    prop::collection::vec((0u128..8, any::<bool>()), 0..6).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(n, deleted)| {
                let status = if deleted { Status::Deleted } else { Status::Active };
                EntityHeader::new(guid(n), "Table").with_status(status)
            })
            .collect()
    })
}

proptest! {
    /// After pruning every guid sits in at most one list, no list but
    /// `deleted` holds a Deleted header, and `deleted` is untouched.
    #[test]
    fn prune_leaves_each_guid_in_one_list(
        created in headers_strategy(),
        updated in headers_strategy(),
        partially_updated in headers_strategy(),
        deleted in headers_strategy(),
    ) {
        let mut batch = MutationBatch {
            created,
            updated,
            partially_updated,
            deleted: deleted.clone(),
        };
        batch.prune();

        prop_assert_eq!(&batch.deleted, &deleted);
        for n in 0u128..8 {
            let g = guid(n);
            let lists = [&batch.created, &batch.updated, &batch.partially_updated, &batch.deleted];
            let holding = lists.iter().filter(|list| list.iter().any(|h| h.guid == g)).count();
            prop_assert!(holding <= 1, "guid {} in {} lists", n, holding);
        }
        for list in [&batch.created, &batch.updated, &batch.partially_updated] {
            prop_assert!(list.iter().all(|h| h.status == Status::Active));
        }
    }
}
