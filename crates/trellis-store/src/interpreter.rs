use crate::data::DataManager;
use crate::debounce::DebounceManager;
use crate::error::StoreError;
use crate::events::InterpreterStoreEvent;
use crate::subscription::{Listener, SubscriptionId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use trellis_schema::{
    validate_schema, BuilderDefinition, EntityContext, EntityDefinition, EntityId, Schema,
    SchemaEntity,
};

/// The full observable state of an interpreter store.
///
/// `entities_values` distinguishes a present-but-unset value (key mapped to
/// `None`) from an entity with no value slot at all (absent key). Every
/// value-allowed entity gets a key at construction time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpreterStoreData {
    /// Runtime values keyed by entity id
    pub entities_values: HashMap<EntityId, Option<Value>>,
    /// Value validation errors keyed by entity id
    pub entities_errors: HashMap<EntityId, String>,
}

/// Initial state for [`InterpreterStore::new`].
#[derive(Debug, Clone, Default)]
pub struct InterpreterStoreOptions {
    /// Explicit initial values; these win over computed defaults, including
    /// an explicit `None`
    pub initial_values: HashMap<EntityId, Option<Value>>,
    /// Initial validation errors
    pub initial_errors: HashMap<EntityId, String>,
}

/// Outcome of a full value validation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitiesValidationResult {
    /// Every eligible entity validated; `data` holds the validated values
    Valid {
        /// Validated value per eligible entity that produced one
        data: HashMap<EntityId, Value>,
    },
    /// At least one eligible entity failed
    Invalid {
        /// Error message per failing entity
        entities_errors: HashMap<EntityId, String>,
    },
}

/// The fill-time store: holds runtime values and validation errors for a
/// fixed, validated schema, and runs eligibility-pruned value validation.
///
/// The schema never changes over the store's lifetime; only values and
/// errors do.
pub struct InterpreterStore {
    builder: Arc<BuilderDefinition>,
    schema: Schema,
    data: DataManager<InterpreterStoreData, InterpreterStoreEvent>,
    debouncer: DebounceManager,
}

impl InterpreterStore {
    /// Create a store over a validated schema.
    ///
    /// Every value-allowed entity gets a value slot: an explicit initial
    /// value when one was supplied (explicit `None` included), otherwise the
    /// type's computed default. Defaults are computed in depth-first order,
    /// so a default can read values seeded before it.
    pub fn new(
        builder: BuilderDefinition,
        schema: Schema,
        options: InterpreterStoreOptions,
    ) -> Result<Self, StoreError> {
        let schema = validate_schema(&schema, &builder)?;

        for id in options.initial_values.keys() {
            require_value_entity(&builder, &schema, id)?;
        }
        for id in options.initial_errors.keys() {
            require_value_entity(&builder, &schema, id)?;
        }

        let mut entities_values: HashMap<EntityId, Option<Value>> = HashMap::new();
        for id in schema.traversal_order() {
            let Some(entity) = schema.entity(&id) else {
                continue;
            };
            let Some(definition) = builder.entity(&entity.entity_type) else {
                continue;
            };
            if !definition.is_value_allowed() {
                continue;
            }

            let value = match options.initial_values.get(&id) {
                Some(value) => value.clone(),
                None => {
                    let context = EntityContext {
                        entity_id: id.clone(),
                        entity: entity.clone(),
                        entities_values: entities_values.clone(),
                    };
                    definition.default_value(&context)
                }
            };
            entities_values.insert(id, value);
        }

        Ok(Self {
            builder: Arc::new(builder),
            schema,
            data: DataManager::new(InterpreterStoreData {
                entities_values,
                entities_errors: options.initial_errors,
            }),
            debouncer: DebounceManager::new(),
        })
    }

    /// The builder definition this store interprets against
    pub fn builder(&self) -> &BuilderDefinition {
        &self.builder
    }

    /// The fixed schema this store interprets
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// A snapshot of the full store state
    pub fn get_data(&self) -> InterpreterStoreData {
        self.data.get()
    }

    /// Replace the whole store state.
    ///
    /// Every referenced entity must exist and track a value.
    pub fn set_data(&self, data: InterpreterStoreData) -> Result<(), StoreError> {
        for id in data.entities_values.keys() {
            require_value_entity(&self.builder, &self.schema, id)?;
        }
        for id in data.entities_errors.keys() {
            require_value_entity(&self.builder, &self.schema, id)?;
        }

        debug!("replacing interpreter store data");
        self.data.set(data, vec![InterpreterStoreEvent::DataSet]);
        Ok(())
    }

    /// Register a listener for state changes
    pub fn subscribe(
        &self,
        listener: Listener<InterpreterStoreData, InterpreterStoreEvent>,
    ) -> SubscriptionId {
        self.data.subscribe(listener)
    }

    /// Remove a previously registered listener
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.data.unsubscribe(id)
    }

    /// Set an entity's value; `None` marks it present but unset
    pub fn set_entity_value(
        &self,
        id: &EntityId,
        value: Option<Value>,
    ) -> Result<(), StoreError> {
        require_value_entity(&self.builder, &self.schema, id)?;

        let mut data = self.data.get();
        data.entities_values.insert(id.clone(), value.clone());

        debug!(id = %id, "set entity value");
        self.data.set(
            data,
            vec![InterpreterStoreEvent::EntityValueUpdated {
                id: id.clone(),
                value,
            }],
        );
        Ok(())
    }

    /// Recompute an entity's value from its type's default
    pub fn reset_entity_value(&self, id: &EntityId) -> Result<(), StoreError> {
        let (entity, definition) = require_value_entity(&self.builder, &self.schema, id)?;

        let mut data = self.data.get();
        let context = EntityContext {
            entity_id: id.clone(),
            entity,
            entities_values: data.entities_values.clone(),
        };
        let value = definition.default_value(&context);
        data.entities_values.insert(id.clone(), value.clone());

        debug!(id = %id, "reset entity value to default");
        self.data.set(
            data,
            vec![InterpreterStoreEvent::EntityValueUpdated {
                id: id.clone(),
                value,
            }],
        );
        Ok(())
    }

    /// Remove an entity's value slot entirely
    pub fn clear_entity_value(&self, id: &EntityId) -> Result<(), StoreError> {
        require_value_entity(&self.builder, &self.schema, id)?;

        let mut data = self.data.get();
        data.entities_values.remove(id);

        debug!(id = %id, "cleared entity value");
        self.data.set(
            data,
            vec![InterpreterStoreEvent::EntityValueUpdated {
                id: id.clone(),
                value: None,
            }],
        );
        Ok(())
    }

    /// Record a value validation error
    pub fn set_entity_error(
        &self,
        id: &EntityId,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        require_value_entity(&self.builder, &self.schema, id)?;
        self.store_entity_error(id, Some(message.into()));
        Ok(())
    }

    /// Clear a value validation error
    pub fn reset_entity_error(&self, id: &EntityId) -> Result<(), StoreError> {
        require_value_entity(&self.builder, &self.schema, id)?;
        self.store_entity_error(id, None);
        Ok(())
    }

    /// Replace all value validation errors
    pub fn set_entities_errors(
        &self,
        errors: HashMap<EntityId, String>,
    ) -> Result<(), StoreError> {
        for id in errors.keys() {
            require_value_entity(&self.builder, &self.schema, id)?;
        }

        let mut data = self.data.get();
        let previous = std::mem::replace(&mut data.entities_errors, errors.clone());

        let mut events = Vec::new();
        for id in previous.keys() {
            if !errors.contains_key(id) {
                events.push(InterpreterStoreEvent::EntityErrorUpdated {
                    id: id.clone(),
                    error: None,
                });
            }
        }
        for (id, message) in &errors {
            events.push(InterpreterStoreEvent::EntityErrorUpdated {
                id: id.clone(),
                error: Some(message.clone()),
            });
        }

        self.data.set(data, events);
        Ok(())
    }

    /// Clear every value validation error
    pub fn reset_entities_errors(&self) {
        let mut data = self.data.get();
        let previous = std::mem::take(&mut data.entities_errors);

        let events = previous
            .into_keys()
            .map(|id| InterpreterStoreEvent::EntityErrorUpdated { id, error: None })
            .collect();
        self.data.set(data, events);
    }

    /// Run one entity's value validator and store the outcome.
    ///
    /// Calls are debounced per entity: a newer call for the same entity
    /// supersedes an in-flight one, whose result is discarded. A failure
    /// message is stored as data, not returned as an error.
    pub async fn validate_entity_value(&self, id: &EntityId) -> Result<(), StoreError> {
        let (entity, definition) = require_value_entity(&self.builder, &self.schema, id)?;

        let data = self.data.get();
        let value = data.entities_values.get(id).cloned().flatten();
        let context = EntityContext {
            entity_id: id.clone(),
            entity,
            entities_values: data.entities_values,
        };

        let outcome = self
            .debouncer
            .debounce(
                id.as_str(),
                async move { Some(definition.validate_value(value, context).await) },
                || None,
            )
            .await;

        if let Some(result) = outcome {
            self.store_entity_error(id, result.err());
        }
        Ok(())
    }

    /// Validate every eligible entity's value in one pass.
    ///
    /// Walks the tree depth-first from the root; an entity whose eligibility
    /// predicate returns false is skipped together with its whole subtree.
    /// Eligible means processed and value-allowed. When `values` is given it
    /// replaces the stored values for this pass, stripped to the eligible
    /// set. Validators run in traversal order and each one sees the values
    /// validated before it. Resulting errors are committed to the store.
    pub async fn validate_entities_values(
        &self,
        values: Option<HashMap<EntityId, Option<Value>>>,
    ) -> EntitiesValidationResult {
        let snapshot = match values {
            Some(values) => values,
            None => self.data.get().entities_values,
        };

        let eligible = self.eligible_ids(&snapshot);
        let eligible_set: HashSet<&EntityId> = eligible.iter().collect();

        let mut working: HashMap<EntityId, Option<Value>> = snapshot
            .into_iter()
            .filter(|(id, _)| eligible_set.contains(id))
            .collect();

        let mut results = HashMap::new();
        let mut errors = HashMap::new();
        for id in &eligible {
            let Some(entity) = self.schema.entity(id) else {
                continue;
            };
            let Some(definition) = self.builder.entity(&entity.entity_type) else {
                continue;
            };

            let value = working.get(id).cloned().flatten();
            let context = EntityContext {
                entity_id: id.clone(),
                entity: entity.clone(),
                entities_values: working.clone(),
            };
            match definition.validate_value(value, context).await {
                Ok(validated) => {
                    working.insert(id.clone(), Some(validated.clone()));
                    results.insert(id.clone(), validated);
                }
                Err(message) => {
                    errors.insert(id.clone(), message);
                }
            }
        }

        self.commit_validation_errors(&eligible, &errors);

        if errors.is_empty() {
            debug!(validated = results.len(), "full validation passed");
            EntitiesValidationResult::Valid { data: results }
        } else {
            debug!(failed = errors.len(), "full validation failed");
            EntitiesValidationResult::Invalid {
                entities_errors: errors,
            }
        }
    }

    /// Depth-first eligible ids: pruned subtrees are skipped entirely,
    /// value-disallowed entities are traversed but not collected.
    fn eligible_ids(&self, values: &HashMap<EntityId, Option<Value>>) -> Vec<EntityId> {
        let mut eligible = Vec::new();
        let mut stack: Vec<EntityId> = self.schema.root.iter().rev().cloned().collect();

        while let Some(id) = stack.pop() {
            let Some(entity) = self.schema.entity(&id) else {
                continue;
            };
            let Some(definition) = self.builder.entity(&entity.entity_type) else {
                continue;
            };

            let context = EntityContext {
                entity_id: id.clone(),
                entity: entity.clone(),
                entities_values: values.clone(),
            };
            if !definition.should_be_processed(&context) {
                continue;
            }

            if definition.is_value_allowed() {
                eligible.push(id.clone());
            }
            for child in entity.children_ids().iter().rev() {
                stack.push(child.clone());
            }
        }
        eligible
    }

    /// Replace the stored errors of every eligible entity with this pass's
    /// outcome, leaving non-eligible entries alone.
    fn commit_validation_errors(
        &self,
        eligible: &[EntityId],
        errors: &HashMap<EntityId, String>,
    ) {
        let mut data = self.data.get();
        let mut events = Vec::new();

        for id in eligible {
            let next = errors.get(id);
            let previous = data.entities_errors.get(id);
            if previous.map(String::as_str) == next.map(String::as_str) {
                continue;
            }
            match next {
                Some(message) => {
                    data.entities_errors.insert(id.clone(), message.clone());
                }
                None => {
                    data.entities_errors.remove(id);
                }
            }
            events.push(InterpreterStoreEvent::EntityErrorUpdated {
                id: id.clone(),
                error: next.cloned(),
            });
        }

        if !events.is_empty() {
            self.data.set(data, events);
        }
    }

    fn store_entity_error(&self, id: &EntityId, error: Option<String>) {
        let mut data = self.data.get();
        match &error {
            Some(message) => {
                data.entities_errors.insert(id.clone(), message.clone());
            }
            None => {
                data.entities_errors.remove(id);
            }
        }
        self.data.set(
            data,
            vec![InterpreterStoreEvent::EntityErrorUpdated {
                id: id.clone(),
                error,
            }],
        );
    }
}

impl std::fmt::Debug for InterpreterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterStore")
            .field("builder", &self.builder)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn require_value_entity(
    builder: &BuilderDefinition,
    schema: &Schema,
    id: &EntityId,
) -> Result<(SchemaEntity, EntityDefinition), StoreError> {
    let entity = schema
        .entity(id)
        .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
    let definition = builder.entity(&entity.entity_type).ok_or_else(|| {
        StoreError::Schema(trellis_schema::SchemaError::UnknownEntityType {
            id: id.clone(),
            entity_type: entity.entity_type.clone(),
        })
    })?;
    if !definition.is_value_allowed() {
        return Err(StoreError::ValueNotAllowed {
            id: id.clone(),
            entity_type: entity.entity_type.clone(),
        });
    }
    Ok((entity.clone(), definition.clone()))
}
