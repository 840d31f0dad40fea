//! End-to-end builder store scenarios: composing a form, restructuring it,
//! and racing debounced attribute validations.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use trellis_schema::{
    AttributeDefinition, BuilderDefinition, EntityDefinition, EntityId, Schema,
};
use trellis_store::{BuilderStore, BuilderStoreEvent, NewEntity, StoreError};

fn form_builder() -> BuilderDefinition {
    BuilderDefinition::new()
        .with_entity(
            EntityDefinition::new("text").with_attribute(AttributeDefinition::sync(
                "label",
                |value, _| value.ok_or_else(|| "label is required".to_string()),
            )),
        )
        .with_entity(EntityDefinition::new("section"))
        .allow_children("section", ["text", "section"])
}

#[test]
fn test_compose_and_restructure_a_form() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();

    let details = store.add_entity(NewEntity::new("section")).unwrap();
    let name = store
        .add_entity(
            NewEntity::new("text")
                .with_parent(details.clone())
                .with_attribute("label", json!("Name")),
        )
        .unwrap();
    let email = store
        .add_entity(
            NewEntity::new("text")
                .with_parent(details.clone())
                .with_attribute("label", json!("Email")),
        )
        .unwrap();

    // Email first.
    store.set_entity_index(&email, 0).unwrap();
    assert_eq!(
        store.get_entity(&details).unwrap().children_ids(),
        &[email.clone(), name.clone()]
    );

    // Split the form: move the name field to the root.
    store.remove_entity_parent_id(&name, None).unwrap();
    assert_eq!(store.get_schema().root, vec![details.clone(), name.clone()]);

    // Duplicate the remaining section.
    let cloned = store.clone_entity(&details).unwrap();
    assert_eq!(cloned.id_map.len(), 2);
    let copy = store.get_entity(&cloned.root_id).unwrap();
    assert_eq!(copy.children_ids().len(), 1);

    // Delete the original; the copy stays intact.
    store.delete_entity(&details).unwrap();
    assert!(store.get_entity(&email).is_none());
    assert!(store.get_entity(&cloned.root_id).is_some());
    assert_eq!(
        store.get_entity(&cloned.id_map[&email]).unwrap().attributes["label"],
        json!("Email")
    );
}

#[test]
fn test_self_parenting_is_rejected_without_side_effects() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let section = store.add_entity(NewEntity::new("section")).unwrap();

    let before = store.get_data();
    let err = store
        .set_entity_parent_id(&section, &section, None)
        .unwrap_err();

    assert_eq!(err.error_code(), "ERR_SCHEMA_SELF_REFERENCE");
    assert_eq!(store.get_data(), before);
}

#[test]
fn test_reparenting_into_own_subtree_is_rejected() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let outer = store.add_entity(NewEntity::new("section")).unwrap();
    let middle = store
        .add_entity(NewEntity::new("section").with_parent(outer.clone()))
        .unwrap();
    let inner = store
        .add_entity(NewEntity::new("section").with_parent(middle.clone()))
        .unwrap();

    let err = store.set_entity_parent_id(&outer, &inner, None).unwrap_err();
    assert_eq!(err.error_code(), "ERR_SCHEMA_CIRCULAR_REFERENCE");
    assert_eq!(store.get_entity(&outer).unwrap().parent_id, None);
}

#[test]
fn test_every_operation_notifies_exactly_once() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let notifications = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&notifications);
    store.subscribe(Box::new(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    }));

    let section = store.add_entity(NewEntity::new("section")).unwrap();
    let text = store
        .add_entity(NewEntity::new("text").with_parent(section.clone()))
        .unwrap();
    store
        .set_entity_attribute(&text, "label", json!("Name"))
        .unwrap();
    store.delete_entity(&section).unwrap();

    assert_eq!(notifications.load(Ordering::SeqCst), 4);
}

#[test]
fn test_failed_operation_emits_nothing() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let text = store.add_entity(NewEntity::new("text")).unwrap();

    let notifications = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&notifications);
    store.subscribe(Box::new(move |_, _| {
        sink.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(store.set_entity_attribute(&text, "nope", json!(1)).is_err());
    assert!(store
        .set_entity_parent_id(&text, &"missing".into(), None)
        .is_err());
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
}

#[test]
fn test_delete_events_cover_whole_subtree() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let outer = store.add_entity(NewEntity::new("section")).unwrap();
    let inner = store
        .add_entity(NewEntity::new("section").with_parent(outer.clone()))
        .unwrap();
    let leaf = store
        .add_entity(NewEntity::new("text").with_parent(inner.clone()))
        .unwrap();

    let deleted: Arc<Mutex<Vec<EntityId>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&deleted);
    store.subscribe(Box::new(move |_, events| {
        for event in events {
            if let BuilderStoreEvent::EntityDeleted { id } = event {
                sink.lock().unwrap().push(id.clone());
            }
        }
    }));

    store.delete_entity(&outer).unwrap();
    assert_eq!(*deleted.lock().unwrap(), vec![leaf, inner, outer]);
}

#[tokio::test]
async fn test_stale_attribute_validation_is_discarded() {
    // The first validation stalls on a gate while a second one for the same
    // attribute runs to completion; the first result must never reach the
    // store.
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let validator_gate = Arc::clone(&gate);
    let validator_calls = Arc::clone(&calls);
    let builder = BuilderDefinition::new().with_entity(
        EntityDefinition::new("text").with_attribute(AttributeDefinition::new(
            "label",
            move |value, _| {
                let gate = Arc::clone(&validator_gate);
                let calls = Arc::clone(&validator_calls);
                Box::pin(async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        gate.notified().await;
                    }
                    value.ok_or_else(|| "label is required".to_string())
                })
            },
        )),
    );

    let store = Arc::new(BuilderStore::new(builder, Schema::new()).unwrap());
    let text = store.add_entity(NewEntity::new("text")).unwrap();

    // First call: no label yet, would record an error once released.
    let slow_store = Arc::clone(&store);
    let slow_id = text.clone();
    let slow = tokio::spawn(async move {
        slow_store
            .validate_entity_attribute(&slow_id, "label")
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second call supersedes it with a passing value.
    store
        .set_entity_attribute(&text, "label", json!("Name"))
        .unwrap();
    store.validate_entity_attribute(&text, "label").await.unwrap();
    assert!(store.get_data().entities_attributes_errors.is_empty());

    gate.notify_one();
    slow.await.unwrap().unwrap();

    // The stale failure was discarded, not stored.
    assert!(store.get_data().entities_attributes_errors.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_validate_all_attributes_across_entities() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let ok = store
        .add_entity(NewEntity::new("text").with_attribute("label", json!("Name")))
        .unwrap();
    let missing = store.add_entity(NewEntity::new("text")).unwrap();
    let section = store.add_entity(NewEntity::new("section")).unwrap();

    store.validate_entities_attributes().await.unwrap();

    let errors = store.get_data().entities_attributes_errors;
    assert!(!errors.contains_key(&ok));
    assert!(!errors.contains_key(&section));
    assert_eq!(errors[&missing]["label"], "label is required");
}

#[test]
fn test_unknown_entity_errors_are_typed() {
    let store = BuilderStore::new(form_builder(), Schema::new()).unwrap();
    let missing = EntityId::from("missing");

    let err = store.delete_entity(&missing).unwrap_err();
    assert_eq!(err, StoreError::EntityNotFound { id: missing.clone() });
    let err = store.clone_entity(&missing).unwrap_err();
    assert_eq!(err.error_code(), "ERR_STORE_ENTITY_NOT_FOUND");
    let err = store
        .set_entity_attribute(&missing, "label", Value::Null)
        .unwrap_err();
    assert_eq!(err.error_code(), "ERR_STORE_ENTITY_NOT_FOUND");
}
