use crate::data::DataManager;
use crate::debounce::DebounceManager;
use crate::error::StoreError;
use crate::events::BuilderStoreEvent;
use crate::subscription::{Listener, SubscriptionId};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;
use trellis_schema::{
    validate_schema, AttributeContext, BuilderDefinition, EntityId, Schema, SchemaEntity,
    SchemaError,
};

/// Input for [`BuilderStore::add_entity`].
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    /// Entity type name, resolved against the builder definition
    pub entity_type: String,
    /// Initial attribute values
    pub attributes: BTreeMap<String, Value>,
    /// Parent to attach under; `None` inserts at the root
    pub parent_id: Option<EntityId>,
    /// Position within the target sibling list; appended when `None`
    pub index: Option<usize>,
}

impl NewEntity {
    /// Describe a new entity of the given type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    /// Set an initial attribute value
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Attach under the given parent
    pub fn with_parent(mut self, parent_id: impl Into<EntityId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Insert at the given sibling position
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

/// Result of [`BuilderStore::clone_entity`]: the new subtree root plus the
/// source-to-copy id mapping for the whole subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonedEntity {
    /// Id of the copied subtree's root
    pub root_id: EntityId,
    /// Source id to copy id, one entry per cloned entity
    pub id_map: HashMap<EntityId, EntityId>,
}

/// The full observable state of a builder store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuilderStoreData {
    /// The current schema tree
    pub schema: Schema,
    /// Attribute validation errors, keyed by entity id then attribute name
    pub entities_attributes_errors: HashMap<EntityId, HashMap<String, String>>,
}

/// The editing-time store: holds a schema, mutates it through
/// integrity-checked operations, runs debounced attribute validation, and
/// notifies subscribers with the events each operation produced.
///
/// Every mutation works on a snapshot: the candidate state is validated in
/// full before it replaces the current one, so a returned error means nothing
/// changed.
pub struct BuilderStore {
    builder: Arc<BuilderDefinition>,
    data: DataManager<BuilderStoreData, BuilderStoreEvent>,
    debouncer: DebounceManager,
}

impl BuilderStore {
    /// Create a store over a validated schema
    pub fn new(builder: BuilderDefinition, schema: Schema) -> Result<Self, StoreError> {
        let schema = validate_schema(&schema, &builder)?;
        Ok(Self {
            builder: Arc::new(builder),
            data: DataManager::new(BuilderStoreData {
                schema,
                entities_attributes_errors: HashMap::new(),
            }),
            debouncer: DebounceManager::new(),
        })
    }

    /// The builder definition this store validates against
    pub fn builder(&self) -> &BuilderDefinition {
        &self.builder
    }

    /// A snapshot of the full store state
    pub fn get_data(&self) -> BuilderStoreData {
        self.data.get()
    }

    /// A snapshot of the current schema
    pub fn get_schema(&self) -> Schema {
        self.data.get().schema
    }

    /// A snapshot of one entity, `None` when the id is unknown
    pub fn get_entity(&self, id: &EntityId) -> Option<SchemaEntity> {
        self.data.get().schema.entities.get(id).cloned()
    }

    /// Replace the whole store state.
    ///
    /// The schema is re-validated and normalized; attribute error entries
    /// must reference existing entities and declared attributes.
    pub fn set_data(&self, data: BuilderStoreData) -> Result<(), StoreError> {
        let schema = validate_schema(&data.schema, &self.builder)?;
        for (id, errors) in &data.entities_attributes_errors {
            let entity = schema
                .entity(id)
                .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
            for attribute in errors.keys() {
                self.require_attribute(id, entity, attribute)?;
            }
        }

        debug!("replacing builder store data");
        self.data.set(
            BuilderStoreData {
                schema,
                entities_attributes_errors: data.entities_attributes_errors,
            },
            vec![BuilderStoreEvent::DataSet],
        );
        Ok(())
    }

    /// Register a listener for state changes
    pub fn subscribe(
        &self,
        listener: Listener<BuilderStoreData, BuilderStoreEvent>,
    ) -> SubscriptionId {
        self.data.subscribe(listener)
    }

    /// Remove a previously registered listener
    pub fn unsubscribe(&self, id: &SubscriptionId) {
        self.data.unsubscribe(id)
    }

    /// Insert a new entity, generating its id.
    ///
    /// With a parent it is attached to the parent's children, otherwise to
    /// the root; `index` positions it within that sibling list (clamped,
    /// appended when absent).
    pub fn add_entity(&self, new_entity: NewEntity) -> Result<EntityId, StoreError> {
        let mut data = self.data.get();

        let id = self.builder.generate_entity_id();
        if !self.builder.validate_entity_id(&id) {
            return Err(StoreError::InvalidGeneratedId { id });
        }
        if data.schema.contains(&id) {
            return Err(StoreError::IdCollision { id });
        }

        let mut entity = SchemaEntity::new(new_entity.entity_type);
        entity.attributes = new_entity.attributes;
        entity.parent_id = new_entity.parent_id.clone();
        data.schema.entities.insert(id.clone(), entity);

        let root_changed = match &new_entity.parent_id {
            Some(parent_id) => {
                let parent = data.schema.entities.get_mut(parent_id).ok_or_else(|| {
                    StoreError::EntityNotFound {
                        id: parent_id.clone(),
                    }
                })?;
                let children = parent.children.get_or_insert_with(Vec::new);
                insert_clamped(children, new_entity.index, id.clone());
                false
            }
            None => {
                insert_clamped(&mut data.schema.root, new_entity.index, id.clone());
                true
            }
        };

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events = Vec::new();
        events.extend(added_event(&data.schema, &id));
        if let Some(parent_id) = &new_entity.parent_id {
            events.extend(updated_event(&data.schema, parent_id));
        }
        if root_changed {
            events.push(BuilderStoreEvent::RootUpdated {
                root: data.schema.root.clone(),
            });
        }

        debug!(id = %id, "added entity");
        self.data.set(data, events);
        Ok(id)
    }

    /// Move an entity under a new parent.
    ///
    /// Rejects self-parenting and any move that would make the entity its
    /// own ancestor, before touching anything.
    pub fn set_entity_parent_id(
        &self,
        id: &EntityId,
        parent_id: &EntityId,
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.get();

        if !data.schema.contains(id) {
            return Err(StoreError::EntityNotFound { id: id.clone() });
        }
        if !data.schema.contains(parent_id) {
            return Err(StoreError::EntityNotFound {
                id: parent_id.clone(),
            });
        }
        if id == parent_id {
            return Err(SchemaError::SelfReference { id: id.clone() }.into());
        }
        if data.schema.is_descendant(parent_id, id) {
            return Err(SchemaError::CircularReference { id: id.clone() }.into());
        }

        let old_parent = detach(&mut data.schema, id);
        let was_root = old_parent.is_none();

        if let Some(entity) = data.schema.entities.get_mut(id) {
            entity.parent_id = Some(parent_id.clone());
        }
        if let Some(parent) = data.schema.entities.get_mut(parent_id) {
            let children = parent.children.get_or_insert_with(Vec::new);
            insert_clamped(children, index, id.clone());
        }

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events = Vec::new();
        events.extend(updated_event(&data.schema, id));
        if let Some(old_parent) = &old_parent {
            if old_parent != parent_id {
                events.extend(updated_event(&data.schema, old_parent));
            }
        }
        events.extend(updated_event(&data.schema, parent_id));
        if was_root {
            events.push(BuilderStoreEvent::RootUpdated {
                root: data.schema.root.clone(),
            });
        }

        debug!(id = %id, parent_id = %parent_id, "moved entity under parent");
        self.data.set(data, events);
        Ok(())
    }

    /// Detach an entity from its parent and place it at the root
    pub fn remove_entity_parent_id(
        &self,
        id: &EntityId,
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.get();

        if !data.schema.contains(id) {
            return Err(StoreError::EntityNotFound { id: id.clone() });
        }

        let old_parent = detach(&mut data.schema, id);
        insert_clamped(&mut data.schema.root, index, id.clone());

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events = Vec::new();
        events.extend(updated_event(&data.schema, id));
        if let Some(old_parent) = &old_parent {
            events.extend(updated_event(&data.schema, old_parent));
        }
        events.push(BuilderStoreEvent::RootUpdated {
            root: data.schema.root.clone(),
        });

        debug!(id = %id, "moved entity to root");
        self.data.set(data, events);
        Ok(())
    }

    /// Reposition an entity within its current sibling list
    pub fn set_entity_index(&self, id: &EntityId, index: usize) -> Result<(), StoreError> {
        let mut data = self.data.get();

        let parent_id = data
            .schema
            .entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?
            .parent_id
            .clone();

        let siblings = match &parent_id {
            Some(parent_id) => data
                .schema
                .entities
                .get_mut(parent_id)
                .and_then(|parent| parent.children.as_mut())
                .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?,
            None => &mut data.schema.root,
        };
        siblings.retain(|sibling| sibling != id);
        insert_clamped(siblings, Some(index), id.clone());

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let events = match &parent_id {
            Some(parent_id) => updated_event(&data.schema, parent_id)
                .into_iter()
                .collect(),
            None => vec![BuilderStoreEvent::RootUpdated {
                root: data.schema.root.clone(),
            }],
        };

        debug!(id = %id, index, "repositioned entity");
        self.data.set(data, events);
        Ok(())
    }

    /// Delete an entity and its whole subtree.
    ///
    /// Descendants are removed bottom-up; their attribute errors and pending
    /// validations go with them.
    pub fn delete_entity(&self, id: &EntityId) -> Result<(), StoreError> {
        let mut data = self.data.get();

        if !data.schema.contains(id) {
            return Err(StoreError::EntityNotFound { id: id.clone() });
        }

        let mut removed = data.schema.descendants(id);
        removed.reverse();
        removed.push(id.clone());

        let old_parent = detach(&mut data.schema, id);
        for removed_id in &removed {
            if let Some(entity) = data.schema.entities.remove(removed_id) {
                self.forget_pending_validations(removed_id, &entity.entity_type);
            }
            data.entities_attributes_errors.remove(removed_id);
        }

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events: Vec<BuilderStoreEvent> = removed
            .iter()
            .map(|removed_id| BuilderStoreEvent::EntityDeleted {
                id: removed_id.clone(),
            })
            .collect();
        match &old_parent {
            Some(old_parent) => events.extend(updated_event(&data.schema, old_parent)),
            None => events.push(BuilderStoreEvent::RootUpdated {
                root: data.schema.root.clone(),
            }),
        }

        debug!(id = %id, removed = removed.len(), "deleted entity subtree");
        self.data.set(data, events);
        Ok(())
    }

    /// Deep-copy an entity and its subtree.
    ///
    /// Every copied entity gets a fresh id; the copy is inserted immediately
    /// after the source in its sibling list. Attribute errors are not copied.
    pub fn clone_entity(&self, id: &EntityId) -> Result<ClonedEntity, StoreError> {
        let mut data = self.data.get();

        if !data.schema.contains(id) {
            return Err(StoreError::EntityNotFound { id: id.clone() });
        }

        let mut subtree = vec![id.clone()];
        subtree.extend(data.schema.descendants(id));

        let mut id_map = HashMap::new();
        for source_id in &subtree {
            let clone_id = self.builder.generate_entity_id();
            if !self.builder.validate_entity_id(&clone_id) {
                return Err(StoreError::InvalidGeneratedId { id: clone_id });
            }
            if data.schema.contains(&clone_id) || id_map.values().any(|v| *v == clone_id) {
                return Err(StoreError::IdCollision { id: clone_id });
            }
            id_map.insert(source_id.clone(), clone_id);
        }

        for source_id in &subtree {
            let mut entity = match data.schema.entity(source_id) {
                Some(entity) => entity.clone(),
                None => continue,
            };
            entity.parent_id = match &entity.parent_id {
                // The subtree root keeps the source's parent; everything
                // below is remapped into the copy.
                Some(parent_id) => Some(id_map.get(parent_id).cloned().unwrap_or_else(|| parent_id.clone())),
                None => None,
            };
            entity.children = entity.children.map(|children| {
                children
                    .iter()
                    .map(|child_id| id_map.get(child_id).cloned().unwrap_or_else(|| child_id.clone()))
                    .collect()
            });
            data.schema
                .entities
                .insert(id_map[source_id].clone(), entity);
        }

        let root_id = id_map[id].clone();
        let parent_id = data.schema.entity(id).and_then(|e| e.parent_id.clone());
        let siblings = match &parent_id {
            Some(parent_id) => data
                .schema
                .entities
                .get_mut(parent_id)
                .and_then(|parent| parent.children.as_mut())
                .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?,
            None => &mut data.schema.root,
        };
        let position = siblings
            .iter()
            .position(|sibling| sibling == id)
            .map(|p| p + 1);
        insert_clamped(siblings, position, root_id.clone());

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events = vec![BuilderStoreEvent::EntityCloned {
            source_id: id.clone(),
            clone_id: root_id.clone(),
        }];
        match &parent_id {
            Some(parent_id) => events.extend(updated_event(&data.schema, parent_id)),
            None => events.push(BuilderStoreEvent::RootUpdated {
                root: data.schema.root.clone(),
            }),
        }

        debug!(id = %id, clone_id = %root_id, entities = id_map.len(), "cloned entity subtree");
        self.data.set(data, events);
        Ok(ClonedEntity { root_id, id_map })
    }

    /// Set a single attribute value
    pub fn set_entity_attribute(
        &self,
        id: &EntityId,
        attribute: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut data = self.data.get();

        let entity = data
            .schema
            .entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        self.require_attribute(id, entity, attribute)?;

        if let Some(entity) = data.schema.entities.get_mut(id) {
            entity.attributes.insert(attribute.to_string(), value.clone());
        }

        data.schema = validate_schema(&data.schema, &self.builder)?;

        let mut events = Vec::new();
        events.extend(updated_event(&data.schema, id));
        events.push(BuilderStoreEvent::EntityAttributeUpdated {
            id: id.clone(),
            attribute: attribute.to_string(),
            value: Some(value),
        });

        debug!(id = %id, attribute, "set attribute");
        self.data.set(data, events);
        Ok(())
    }

    /// Run one attribute's validator and store the outcome.
    ///
    /// Calls are debounced per `(entity, attribute)`: when a newer call for
    /// the same pair starts before this one resolves, this one's result is
    /// discarded and the store is left for the newer call to update. A
    /// failure message is stored as data, not returned as an error.
    pub async fn validate_entity_attribute(
        &self,
        id: &EntityId,
        attribute: &str,
    ) -> Result<(), StoreError> {
        let data = self.data.get();
        let entity = data
            .schema
            .entity(id)
            .cloned()
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        let definition = self.require_attribute(id, &entity, attribute)?.clone();

        let value = entity.attributes.get(attribute).cloned();
        let context = AttributeContext {
            schema: data.schema,
            entity_id: id.clone(),
            entity,
        };

        let key = debounce_key(id, attribute);
        let outcome = self
            .debouncer
            .debounce(
                &key,
                async move { Some(definition.validate(value, context).await) },
                || None,
            )
            .await;

        if let Some(result) = outcome {
            self.store_attribute_error(id, attribute, result.err());
        }
        Ok(())
    }

    /// Validate every declared attribute of one entity
    pub async fn validate_entity_attributes(&self, id: &EntityId) -> Result<(), StoreError> {
        let entity = self
            .get_entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        let definition = self.builder.entity(&entity.entity_type).ok_or_else(|| {
            StoreError::Schema(SchemaError::UnknownEntityType {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
            })
        })?;

        let attributes: Vec<String> = definition
            .attributes()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        for attribute in attributes {
            self.validate_entity_attribute(id, &attribute).await?;
        }
        Ok(())
    }

    /// Validate every declared attribute of every entity
    pub async fn validate_entities_attributes(&self) -> Result<(), StoreError> {
        let ids: Vec<EntityId> = self.data.get().schema.entities.keys().cloned().collect();
        for id in ids {
            // An earlier iteration may have raced a delete; skip gone ids.
            if self.get_entity(&id).is_none() {
                continue;
            }
            self.validate_entity_attributes(&id).await?;
        }
        Ok(())
    }

    /// Record an attribute validation error
    pub fn set_entity_attribute_error(
        &self,
        id: &EntityId,
        attribute: &str,
        message: impl Into<String>,
    ) -> Result<(), StoreError> {
        let entity = self
            .get_entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        self.require_attribute(id, &entity, attribute)?;
        self.store_attribute_error(id, attribute, Some(message.into()));
        Ok(())
    }

    /// Clear an attribute validation error
    pub fn reset_entity_attribute_error(
        &self,
        id: &EntityId,
        attribute: &str,
    ) -> Result<(), StoreError> {
        let entity = self
            .get_entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        self.require_attribute(id, &entity, attribute)?;
        self.store_attribute_error(id, attribute, None);
        Ok(())
    }

    /// Replace all attribute errors of one entity
    pub fn set_entity_attributes_errors(
        &self,
        id: &EntityId,
        errors: HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let mut data = self.data.get();

        let entity = data
            .schema
            .entity(id)
            .ok_or_else(|| StoreError::EntityNotFound { id: id.clone() })?;
        for attribute in errors.keys() {
            self.require_attribute(id, entity, attribute)?;
        }

        let previous = data
            .entities_attributes_errors
            .remove(id)
            .unwrap_or_default();
        let mut events = Vec::new();
        for attribute in previous.keys() {
            if !errors.contains_key(attribute) {
                events.push(BuilderStoreEvent::EntityAttributeErrorUpdated {
                    id: id.clone(),
                    attribute: attribute.clone(),
                    error: None,
                });
            }
        }
        for (attribute, message) in &errors {
            events.push(BuilderStoreEvent::EntityAttributeErrorUpdated {
                id: id.clone(),
                attribute: attribute.clone(),
                error: Some(message.clone()),
            });
        }
        if !errors.is_empty() {
            data.entities_attributes_errors.insert(id.clone(), errors);
        }

        self.data.set(data, events);
        Ok(())
    }

    /// Clear all attribute errors of one entity
    pub fn reset_entity_attributes_errors(&self, id: &EntityId) -> Result<(), StoreError> {
        self.set_entity_attributes_errors(id, HashMap::new())
    }

    /// Clear every attribute error in the store
    pub fn reset_entities_attributes_errors(&self) {
        let mut data = self.data.get();
        let previous = std::mem::take(&mut data.entities_attributes_errors);

        let mut events = Vec::new();
        for (id, errors) in previous {
            for attribute in errors.into_keys() {
                events.push(BuilderStoreEvent::EntityAttributeErrorUpdated {
                    id: id.clone(),
                    attribute,
                    error: None,
                });
            }
        }

        self.data.set(data, events);
    }

    fn require_attribute<'a>(
        &'a self,
        id: &EntityId,
        entity: &SchemaEntity,
        attribute: &str,
    ) -> Result<&'a trellis_schema::AttributeDefinition, StoreError> {
        let definition = self.builder.entity(&entity.entity_type).ok_or_else(|| {
            StoreError::Schema(SchemaError::UnknownEntityType {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
            })
        })?;
        definition
            .attribute(attribute)
            .ok_or_else(|| StoreError::UnknownAttribute {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
                attribute: attribute.to_string(),
            })
    }

    /// Write one attribute error slot, tolerating an entity deleted while a
    /// validation was in flight.
    fn store_attribute_error(&self, id: &EntityId, attribute: &str, error: Option<String>) {
        let mut data = self.data.get();
        if !data.schema.contains(id) {
            return;
        }

        match &error {
            Some(message) => {
                data.entities_attributes_errors
                    .entry(id.clone())
                    .or_default()
                    .insert(attribute.to_string(), message.clone());
            }
            None => {
                if let Some(errors) = data.entities_attributes_errors.get_mut(id) {
                    errors.remove(attribute);
                    if errors.is_empty() {
                        data.entities_attributes_errors.remove(id);
                    }
                }
            }
        }

        let events = vec![BuilderStoreEvent::EntityAttributeErrorUpdated {
            id: id.clone(),
            attribute: attribute.to_string(),
            error,
        }];
        self.data.set(data, events);
    }

    fn forget_pending_validations(&self, id: &EntityId, entity_type: &str) {
        if let Some(definition) = self.builder.entity(entity_type) {
            for attribute in definition.attributes() {
                self.debouncer.forget(&debounce_key(id, attribute.name()));
            }
        }
    }
}

impl std::fmt::Debug for BuilderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderStore")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

fn debounce_key(id: &EntityId, attribute: &str) -> String {
    format!("{}-{}", id, attribute)
}

fn added_event(schema: &Schema, id: &EntityId) -> Option<BuilderStoreEvent> {
    schema.entity(id).map(|entity| BuilderStoreEvent::EntityAdded {
        id: id.clone(),
        entity: entity.clone(),
    })
}

fn updated_event(schema: &Schema, id: &EntityId) -> Option<BuilderStoreEvent> {
    schema.entity(id).map(|entity| BuilderStoreEvent::EntityUpdated {
        id: id.clone(),
        entity: entity.clone(),
    })
}

fn insert_clamped(list: &mut Vec<EntityId>, index: Option<usize>, id: EntityId) {
    let index = index.unwrap_or(list.len()).min(list.len());
    list.insert(index, id);
}

/// Remove `id` from its current sibling list (root or parent children) and
/// clear its parent link. Returns the old parent id, `None` for root-level.
fn detach(schema: &mut Schema, id: &EntityId) -> Option<EntityId> {
    let old_parent = schema.entity(id).and_then(|e| e.parent_id.clone());

    match &old_parent {
        Some(parent_id) => {
            if let Some(parent) = schema.entities.get_mut(parent_id) {
                if let Some(children) = parent.children.as_mut() {
                    children.retain(|child| child != id);
                    if children.is_empty() {
                        parent.children = None;
                    }
                }
            }
        }
        None => schema.root.retain(|root_id| root_id != id),
    }

    if let Some(entity) = schema.entities.get_mut(id) {
        entity.parent_id = None;
    }
    old_parent
}
