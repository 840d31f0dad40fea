use serde::Serialize;
use serde_json::Value;
use trellis_schema::{EntityId, SchemaEntity};

/// Semantic changes emitted by the builder store.
///
/// One store operation emits the ordered list of every semantic change it
/// performed; subscribers receive the list together with the resulting data
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BuilderStoreEvent {
    /// A new entity was inserted into the schema
    EntityAdded {
        /// Id of the new entity
        id: EntityId,
        /// Snapshot of the entity as inserted
        entity: SchemaEntity,
    },
    /// An existing entity changed (attributes, parent or children)
    EntityUpdated {
        /// Id of the changed entity
        id: EntityId,
        /// Snapshot of the entity after the change
        entity: SchemaEntity,
    },
    /// A single attribute value changed
    EntityAttributeUpdated {
        /// Id of the owning entity
        id: EntityId,
        /// Name of the changed attribute
        attribute: String,
        /// New raw value, `None` when the attribute was removed
        value: Option<Value>,
    },
    /// A single attribute validation error changed
    EntityAttributeErrorUpdated {
        /// Id of the owning entity
        id: EntityId,
        /// Name of the attribute the error belongs to
        attribute: String,
        /// New error message, `None` when the error was cleared
        error: Option<String>,
    },
    /// An entity was removed from the schema
    EntityDeleted {
        /// Id of the removed entity
        id: EntityId,
    },
    /// A subtree was deep-copied
    EntityCloned {
        /// Id of the entity that was cloned
        source_id: EntityId,
        /// Id of the new copy
        clone_id: EntityId,
    },
    /// The ordered list of top-level entities changed
    RootUpdated {
        /// The new root ordering
        root: Vec<EntityId>,
    },
    /// The whole store state was replaced
    DataSet,
}

impl BuilderStoreEvent {
    /// Stable discriminator for the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            BuilderStoreEvent::EntityAdded { .. } => "EntityAdded",
            BuilderStoreEvent::EntityUpdated { .. } => "EntityUpdated",
            BuilderStoreEvent::EntityAttributeUpdated { .. } => "EntityAttributeUpdated",
            BuilderStoreEvent::EntityAttributeErrorUpdated { .. } => {
                "EntityAttributeErrorUpdated"
            }
            BuilderStoreEvent::EntityDeleted { .. } => "EntityDeleted",
            BuilderStoreEvent::EntityCloned { .. } => "EntityCloned",
            BuilderStoreEvent::RootUpdated { .. } => "RootUpdated",
            BuilderStoreEvent::DataSet => "DataSet",
        }
    }
}

/// Semantic changes emitted by the interpreter store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InterpreterStoreEvent {
    /// A runtime value changed
    EntityValueUpdated {
        /// Id of the owning entity
        id: EntityId,
        /// New value; `None` is a present-but-unset value or a cleared slot
        value: Option<Value>,
    },
    /// A value validation error changed
    EntityErrorUpdated {
        /// Id of the owning entity
        id: EntityId,
        /// New error message, `None` when the error was cleared
        error: Option<String>,
    },
    /// The whole store state was replaced
    DataSet,
}

impl InterpreterStoreEvent {
    /// Stable discriminator for the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            InterpreterStoreEvent::EntityValueUpdated { .. } => "EntityValueUpdated",
            InterpreterStoreEvent::EntityErrorUpdated { .. } => "EntityErrorUpdated",
            InterpreterStoreEvent::DataSet => "DataSet",
        }
    }
}
