//! End-to-end interpreter store scenarios: seeding, filling and validating a
//! form, with eligibility pruning and debounced single-value validation.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use trellis_schema::{
    AttributeDefinition, BuilderDefinition, EntityDefinition, EntityId, EntityIdentifier, Schema,
    SchemaEntity,
};
use trellis_store::{
    EntitiesValidationResult, InterpreterStore, InterpreterStoreOptions,
};

struct AnyId;
impl EntityIdentifier for AnyId {
    fn generate(&self) -> String {
        unreachable!("tests supply their own ids")
    }
    fn validate(&self, id: &str) -> bool {
        !id.is_empty()
    }
}

fn form_builder() -> BuilderDefinition {
    BuilderDefinition::new()
        .with_entity(
            EntityDefinition::new("text").with_sync_validator(|value, _| match value {
                Some(Value::String(s)) if !s.is_empty() => Ok(Value::String(s)),
                Some(other) => Err(format!("expected a string, got {other}")),
                None => Err("value is required".to_string()),
            }),
        )
        .with_entity(
            EntityDefinition::new("section")
                .with_attribute(AttributeDefinition::sync("skip", |value, _| {
                    Ok(value.unwrap_or(json!(false)))
                }))
                .with_should_be_processed(|context| {
                    context.entity.attributes.get("skip") != Some(&json!(true))
                }),
        )
        .allow_children("section", ["text", "section"])
        .with_identifier(AnyId)
}

/// A (text) at the root, next to a skipped section holding C (text).
fn pruned_form() -> Schema {
    let mut schema = Schema::new();
    schema.entities.insert("a".into(), SchemaEntity::new("text"));
    schema.entities.insert(
        "b".into(),
        SchemaEntity::new("section")
            .with_attribute("skip", json!(true))
            .with_children(vec!["c".into()]),
    );
    schema
        .entities
        .insert("c".into(), SchemaEntity::new("text").with_parent("b"));
    schema.root = vec!["a".into(), "b".into()];
    schema
}

#[tokio::test]
async fn test_skipped_subtree_is_not_validated() {
    let store = InterpreterStore::new(
        form_builder(),
        pruned_form(),
        InterpreterStoreOptions {
            initial_values: HashMap::from([(EntityId::from("a"), Some(json!("hi")))]),
            initial_errors: HashMap::new(),
        },
    )
    .unwrap();

    // C has no value and would fail, but its subtree is pruned.
    let result = store.validate_entities_values(None).await;
    assert_eq!(
        result,
        EntitiesValidationResult::Valid {
            data: HashMap::from([(EntityId::from("a"), json!("hi"))])
        }
    );
    assert!(store.get_data().entities_errors.is_empty());
}

#[tokio::test]
async fn test_unskipped_subtree_is_validated_again() {
    let mut schema = pruned_form();
    if let Some(section) = schema.entities.get_mut(&EntityId::from("b")) {
        section.attributes.insert("skip".to_string(), json!(false));
    }

    let store = InterpreterStore::new(
        form_builder(),
        schema,
        InterpreterStoreOptions {
            initial_values: HashMap::from([(EntityId::from("a"), Some(json!("hi")))]),
            initial_errors: HashMap::new(),
        },
    )
    .unwrap();

    let result = store.validate_entities_values(None).await;
    assert_eq!(
        result,
        EntitiesValidationResult::Invalid {
            entities_errors: HashMap::from([(
                EntityId::from("c"),
                "value is required".to_string()
            )])
        }
    );
    // The failure is also committed to the store.
    assert_eq!(
        store.get_data().entities_errors[&EntityId::from("c")],
        "value is required"
    );
}

#[tokio::test]
async fn test_caller_values_override_without_mutating_store() {
    let store = InterpreterStore::new(
        form_builder(),
        pruned_form(),
        InterpreterStoreOptions::default(),
    )
    .unwrap();
    store
        .set_entity_value(&"a".into(), Some(json!("stored")))
        .unwrap();

    let result = store
        .validate_entities_values(Some(HashMap::from([(
            EntityId::from("a"),
            Some(json!("override")),
        )])))
        .await;

    assert_eq!(
        result,
        EntitiesValidationResult::Valid {
            data: HashMap::from([(EntityId::from("a"), json!("override"))])
        }
    );
    assert_eq!(
        store.get_data().entities_values[&EntityId::from("a")],
        Some(json!("stored"))
    );
}

#[tokio::test]
async fn test_full_fill_and_correct_cycle() {
    let mut schema = Schema::new();
    schema.entities.insert(
        "form".into(),
        SchemaEntity::new("section").with_children(vec!["name".into(), "email".into()]),
    );
    schema
        .entities
        .insert("name".into(), SchemaEntity::new("text").with_parent("form"));
    schema
        .entities
        .insert("email".into(), SchemaEntity::new("text").with_parent("form"));
    schema.root = vec!["form".into()];

    let store =
        InterpreterStore::new(form_builder(), schema, InterpreterStoreOptions::default())
            .unwrap();

    // First submission: both fields empty.
    let result = store.validate_entities_values(None).await;
    let EntitiesValidationResult::Invalid { entities_errors } = result else {
        panic!("expected a failed validation");
    };
    assert_eq!(entities_errors.len(), 2);

    // The user fixes one field; the other error survives the next pass.
    store
        .set_entity_value(&"name".into(), Some(json!("Jane")))
        .unwrap();
    let result = store.validate_entities_values(None).await;
    let EntitiesValidationResult::Invalid { entities_errors } = result else {
        panic!("expected a failed validation");
    };
    assert_eq!(
        entities_errors,
        HashMap::from([(EntityId::from("email"), "value is required".to_string())])
    );
    assert!(!store
        .get_data()
        .entities_errors
        .contains_key(&EntityId::from("name")));

    // Both fixed: clean pass, errors cleared.
    store
        .set_entity_value(&"email".into(), Some(json!("jane@example.com")))
        .unwrap();
    let result = store.validate_entities_values(None).await;
    assert_eq!(
        result,
        EntitiesValidationResult::Valid {
            data: HashMap::from([
                (EntityId::from("name"), json!("Jane")),
                (EntityId::from("email"), json!("jane@example.com")),
            ])
        }
    );
    assert!(store.get_data().entities_errors.is_empty());
}

#[tokio::test]
async fn test_stale_value_validation_is_discarded() {
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let validator_gate = Arc::clone(&gate);
    let validator_calls = Arc::clone(&calls);
    let builder = BuilderDefinition::new().with_entity(
        EntityDefinition::new("text").with_validator(move |value, _| {
            let gate = Arc::clone(&validator_gate);
            let calls = Arc::clone(&validator_calls);
            Box::pin(async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    gate.notified().await;
                }
                value.ok_or_else(|| "value is required".to_string())
            })
        }),
    )
    .with_identifier(AnyId);

    let mut schema = Schema::new();
    schema.entities.insert("a".into(), SchemaEntity::new("text"));
    schema.root = vec!["a".into()];

    let store = Arc::new(
        InterpreterStore::new(builder, schema, InterpreterStoreOptions::default()).unwrap(),
    );

    // First call stalls with no value; it would store an error.
    let slow_store = Arc::clone(&store);
    let slow = tokio::spawn(async move {
        slow_store.validate_entity_value(&"a".into()).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second call passes with a real value.
    store.set_entity_value(&"a".into(), Some(json!("hi"))).unwrap();
    store.validate_entity_value(&"a".into()).await.unwrap();
    assert!(store.get_data().entities_errors.is_empty());

    gate.notify_one();
    slow.await.unwrap().unwrap();

    assert!(store.get_data().entities_errors.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
