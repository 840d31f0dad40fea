//! Schema integrity validation.
//!
//! [`validate_schema`] checks a typed [`Schema`] against a
//! [`BuilderDefinition`] and returns a normalized copy or the first provable
//! violation (fail-fast). [`validate_schema_value`] does the same starting
//! from raw JSON, producing format-level error codes for malformed input
//! before handing off to the semantic checks.

mod integrity;

use crate::definition::BuilderDefinition;
use crate::error::SchemaError;
use crate::model::{EntityId, Schema, SchemaEntity};
use std::collections::BTreeMap;

/// Stable machine-readable schema validation error codes
pub mod codes {
    /// Root is not an array of entity id strings
    pub const INVALID_ROOT_FORMAT: &str = "ERR_SCHEMA_INVALID_ROOT_FORMAT";

    /// Duplicate entity id in root
    pub const DUPLICATE_ROOT_ID: &str = "ERR_SCHEMA_DUPLICATE_ROOT_ID";

    /// Empty root with non-empty entities
    pub const EMPTY_ROOT: &str = "ERR_SCHEMA_EMPTY_ROOT";

    /// Entities is not an object keyed by entity id
    pub const INVALID_ENTITIES_FORMAT: &str = "ERR_SCHEMA_INVALID_ENTITIES_FORMAT";

    /// Referenced entity id does not exist
    pub const NONEXISTENT_ENTITY_ID: &str = "ERR_SCHEMA_NONEXISTENT_ENTITY_ID";

    /// Entity id fails the identifier provider's format check
    pub const INVALID_ENTITY_ID: &str = "ERR_SCHEMA_INVALID_ENTITY_ID";

    /// Entity type is not registered in the builder definition
    pub const UNKNOWN_ENTITY_TYPE: &str = "ERR_SCHEMA_UNKNOWN_ENTITY_TYPE";

    /// Attributes field is missing or not an object
    pub const INVALID_ATTRIBUTES_FORMAT: &str = "ERR_SCHEMA_INVALID_ATTRIBUTES_FORMAT";

    /// Attribute name is not declared for the entity's type
    pub const UNKNOWN_ATTRIBUTE: &str = "ERR_SCHEMA_UNKNOWN_ATTRIBUTE";

    /// Entity references itself as parent or child
    pub const SELF_REFERENCE: &str = "ERR_SCHEMA_SELF_REFERENCE";

    /// Children field is not an array of id strings
    pub const INVALID_CHILDREN_FORMAT: &str = "ERR_SCHEMA_INVALID_CHILDREN_FORMAT";

    /// Duplicate id within one entity's children
    pub const DUPLICATE_CHILD_ID: &str = "ERR_SCHEMA_DUPLICATE_CHILD_ID";

    /// Entity type may not have children at all
    pub const CHILDREN_NOT_ALLOWED: &str = "ERR_SCHEMA_CHILDREN_NOT_ALLOWED";

    /// Child type is not allowed under the parent type
    pub const CHILD_NOT_ALLOWED: &str = "ERR_SCHEMA_CHILD_NOT_ALLOWED";

    /// Listed child does not reference the entity back as parent
    pub const CHILD_PARENT_MISMATCH: &str = "ERR_SCHEMA_CHILD_PARENT_MISMATCH";

    /// Entity's parent does not list it as a child
    pub const PARENT_CHILD_MISMATCH: &str = "ERR_SCHEMA_PARENT_CHILD_MISMATCH";

    /// Entity appears in root while carrying a parent
    pub const ROOT_ENTITY_WITH_PARENT: &str = "ERR_SCHEMA_ROOT_ENTITY_WITH_PARENT";

    /// Entity type requires a parent but none is set
    pub const PARENT_REQUIRED: &str = "ERR_SCHEMA_PARENT_REQUIRED";

    /// Entity is its own ancestor
    pub const CIRCULAR_REFERENCE: &str = "ERR_SCHEMA_CIRCULAR_REFERENCE";

    /// Entity is not reachable from the root
    pub const UNREACHABLE_ENTITY: &str = "ERR_SCHEMA_UNREACHABLE_ENTITY";

    /// JSON processing error
    pub const JSON: &str = "ERR_SCHEMA_JSON";
}

/// Validate a typed schema against a builder definition.
///
/// Checks every integrity invariant and returns a normalized copy of the
/// schema on success, or the first violation it can prove. Validating the
/// normalized output again yields an identical schema.
pub fn validate_schema(
    schema: &Schema,
    builder: &BuilderDefinition,
) -> Result<Schema, SchemaError> {
    integrity::IntegrityChecker::new(schema, builder).check()
}

/// Validate a raw JSON value as a schema.
///
/// Shape errors (non-array root, non-object entities or attributes, malformed
/// children) are reported with format-level codes; extraneous fields are
/// dropped; the result then goes through [`validate_schema`].
pub fn validate_schema_value(
    value: &serde_json::Value,
    builder: &BuilderDefinition,
) -> Result<Schema, SchemaError> {
    let object = value
        .as_object()
        .ok_or(SchemaError::InvalidEntitiesFormat)?;

    let root = parse_root(object.get("root"))?;
    let entities = parse_entities(object.get("entities"))?;

    let schema = Schema { entities, root };
    validate_schema(&schema, builder)
}

fn parse_root(value: Option<&serde_json::Value>) -> Result<Vec<EntityId>, SchemaError> {
    let items = value
        .and_then(|v| v.as_array())
        .ok_or(SchemaError::InvalidRootFormat)?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| EntityId(s.to_string()))
                .ok_or(SchemaError::InvalidRootFormat)
        })
        .collect()
}

fn parse_entities(
    value: Option<&serde_json::Value>,
) -> Result<BTreeMap<EntityId, SchemaEntity>, SchemaError> {
    let object = value
        .and_then(|v| v.as_object())
        .ok_or(SchemaError::InvalidEntitiesFormat)?;

    let mut entities = BTreeMap::new();
    for (id, raw) in object {
        let id = EntityId(id.clone());
        let entity = parse_entity(&id, raw)?;
        entities.insert(id, entity);
    }
    Ok(entities)
}

fn parse_entity(id: &EntityId, value: &serde_json::Value) -> Result<SchemaEntity, SchemaError> {
    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::InvalidEntitiesFormat)?;

    let entity_type = object
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SchemaError::UnknownEntityType {
            id: id.clone(),
            entity_type: String::new(),
        })?
        .to_string();

    let attributes = object
        .get("attributes")
        .and_then(|v| v.as_object())
        .ok_or_else(|| SchemaError::InvalidAttributesFormat { id: id.clone() })?
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let parent_id = match object.get("parentId") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(EntityId(s.clone())),
        Some(_) => return Err(SchemaError::InvalidEntityId { id: id.0.clone() }),
    };

    let children = match object.get("children") {
        None => None,
        Some(serde_json::Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(|s| EntityId(s.to_string()))
                        .ok_or_else(|| SchemaError::InvalidChildrenFormat { id: id.clone() })
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => return Err(SchemaError::InvalidChildrenFormat { id: id.clone() }),
    };

    Ok(SchemaEntity {
        entity_type,
        attributes,
        parent_id,
        children,
    })
}
