use crate::model::EntityId;
use thiserror::Error;

/// All possible schema integrity violations.
///
/// Each variant corresponds to one stable machine-readable code (see
/// [`crate::validation::codes`] and [`SchemaError::error_code`]) and carries
/// the offending id(s). These errors indicate a caller or schema-authoring
/// bug: operations abort with no partial mutation when one is raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The root is not an array of entity id strings
    #[error("Schema root must be an array of entity id strings")]
    InvalidRootFormat,

    /// The same id appears more than once in the root
    #[error("Duplicate entity id in root: {id}")]
    DuplicateRootId {
        /// The repeated id
        id: EntityId,
    },

    /// The root is empty while the schema still contains entities
    #[error("Schema root is empty but entities are present")]
    EmptyRoot,

    /// The entities map is not an object of id to entity
    #[error("Schema entities must be an object keyed by entity id")]
    InvalidEntitiesFormat,

    /// A referenced entity id does not exist in the entities map
    #[error("Entity not found: {id}")]
    NonexistentEntityId {
        /// The dangling id
        id: EntityId,
    },

    /// An entity id is not well-formed per the builder's identifier provider
    #[error("Invalid entity id: {id}")]
    InvalidEntityId {
        /// The malformed id
        id: String,
    },

    /// An entity's type is not registered in the builder definition
    #[error("Unknown entity type '{entity_type}' for entity {id}")]
    UnknownEntityType {
        /// The entity carrying the unknown type
        id: EntityId,
        /// The unregistered type name
        entity_type: String,
    },

    /// An entity's attributes field is missing or not an object
    #[error("Entity {id} has an invalid or missing attributes object")]
    InvalidAttributesFormat {
        /// The offending entity
        id: EntityId,
    },

    /// An attribute name is not declared for the entity's type
    #[error("Unknown attribute '{attribute}' for entity {id} of type '{entity_type}'")]
    UnknownAttribute {
        /// The entity carrying the unknown attribute
        id: EntityId,
        /// The entity's type
        entity_type: String,
        /// The undeclared attribute name
        attribute: String,
    },

    /// An entity references itself as parent or child
    #[error("Entity {id} references itself")]
    SelfReference {
        /// The self-referencing entity
        id: EntityId,
    },

    /// An entity's children field is not an array of id strings
    #[error("Entity {id} has an invalid children format")]
    InvalidChildrenFormat {
        /// The offending entity
        id: EntityId,
    },

    /// The same id appears more than once in an entity's children
    #[error("Duplicate child id {child_id} under entity {id}")]
    DuplicateChildId {
        /// The parent entity
        id: EntityId,
        /// The repeated child id
        child_id: EntityId,
    },

    /// The entity's type may not have children at all
    #[error("Entity {id} of type '{entity_type}' does not allow children")]
    ChildrenNotAllowed {
        /// The offending parent entity
        id: EntityId,
        /// The parent's type
        entity_type: String,
    },

    /// The child's type is not allowed under the parent's type
    #[error(
        "Entity {child_id} of type '{child_type}' is not allowed under entity {id} of type '{entity_type}'"
    )]
    ChildNotAllowed {
        /// The parent entity
        id: EntityId,
        /// The parent's type
        entity_type: String,
        /// The rejected child
        child_id: EntityId,
        /// The child's type
        child_type: String,
    },

    /// A listed child does not reference the entity back as its parent
    #[error("Child {child_id} of entity {id} does not reference it as parent")]
    ChildParentMismatch {
        /// The parent entity
        id: EntityId,
        /// The inconsistent child
        child_id: EntityId,
    },

    /// An entity's parent does not list it among its children
    #[error("Entity {id} references parent {parent_id} which does not list it as a child")]
    ParentChildMismatch {
        /// The child entity
        id: EntityId,
        /// The inconsistent parent
        parent_id: EntityId,
    },

    /// An entity is both in the root and assigned a parent
    #[error("Entity {id} is in the root but has a parent")]
    RootEntityWithParent {
        /// The offending entity
        id: EntityId,
    },

    /// The entity's type requires a parent but none is set
    #[error("Entity {id} of type '{entity_type}' requires a parent")]
    ParentRequired {
        /// The orphaned entity
        id: EntityId,
        /// The parent-requiring type
        entity_type: String,
    },

    /// An entity is part of a parent cycle and so its own ancestor
    #[error("Entity {id} is an ancestor of itself")]
    CircularReference {
        /// An entity on the cycle
        id: EntityId,
    },

    /// An entity is neither in the root nor reachable through children
    #[error("Entity {id} is not reachable from the root")]
    UnreachableEntity {
        /// The unreachable entity
        id: EntityId,
    },

    /// Errors that occur during JSON processing
    #[error("JSON processing error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Json(err.to_string())
    }
}

impl SchemaError {
    /// Get the stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        use crate::validation::codes;
        match self {
            SchemaError::InvalidRootFormat => codes::INVALID_ROOT_FORMAT,
            SchemaError::DuplicateRootId { .. } => codes::DUPLICATE_ROOT_ID,
            SchemaError::EmptyRoot => codes::EMPTY_ROOT,
            SchemaError::InvalidEntitiesFormat => codes::INVALID_ENTITIES_FORMAT,
            SchemaError::NonexistentEntityId { .. } => codes::NONEXISTENT_ENTITY_ID,
            SchemaError::InvalidEntityId { .. } => codes::INVALID_ENTITY_ID,
            SchemaError::UnknownEntityType { .. } => codes::UNKNOWN_ENTITY_TYPE,
            SchemaError::InvalidAttributesFormat { .. } => codes::INVALID_ATTRIBUTES_FORMAT,
            SchemaError::UnknownAttribute { .. } => codes::UNKNOWN_ATTRIBUTE,
            SchemaError::SelfReference { .. } => codes::SELF_REFERENCE,
            SchemaError::InvalidChildrenFormat { .. } => codes::INVALID_CHILDREN_FORMAT,
            SchemaError::DuplicateChildId { .. } => codes::DUPLICATE_CHILD_ID,
            SchemaError::ChildrenNotAllowed { .. } => codes::CHILDREN_NOT_ALLOWED,
            SchemaError::ChildNotAllowed { .. } => codes::CHILD_NOT_ALLOWED,
            SchemaError::ChildParentMismatch { .. } => codes::CHILD_PARENT_MISMATCH,
            SchemaError::ParentChildMismatch { .. } => codes::PARENT_CHILD_MISMATCH,
            SchemaError::RootEntityWithParent { .. } => codes::ROOT_ENTITY_WITH_PARENT,
            SchemaError::ParentRequired { .. } => codes::PARENT_REQUIRED,
            SchemaError::CircularReference { .. } => codes::CIRCULAR_REFERENCE,
            SchemaError::UnreachableEntity { .. } => codes::UNREACHABLE_ENTITY,
            SchemaError::Json(_) => codes::JSON,
        }
    }
}
