use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Value object: Entity ID
///
/// An opaque identifier for an entity in a schema tree. The format is decided
/// by the builder definition's identifier provider (UUID v4 by default).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Get the identifier as a string slice
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// A single typed node in a schema tree.
///
/// The serialized shape is
/// `{ "type": ..., "attributes": {...}, "parentId"?: ..., "children"?: [...] }`.
/// Only these four fields survive integrity validation; anything else in the
/// raw input is dropped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntity {
    /// Name of the entity type, resolved against the builder definition
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Raw attribute values keyed by attribute name
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Id of the parent entity, if this entity is not at the root
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,

    /// Ordered ids of the child entities, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<EntityId>>,
}

impl SchemaEntity {
    /// Create a new entity of the given type with no attributes
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
            parent_id: None,
            children: None,
        }
    }

    /// Set an attribute value, consuming and returning the entity
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Set the parent id, consuming and returning the entity
    pub fn with_parent(mut self, parent_id: impl Into<EntityId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the children list, consuming and returning the entity
    pub fn with_children(mut self, children: Vec<EntityId>) -> Self {
        self.children = Some(children);
        self
    }

    /// The children list, empty when the entity has none
    pub fn children_ids(&self) -> &[EntityId] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// The serializable tree of entities plus root ordering.
///
/// `entities` maps ids to nodes; `root` is the ordered list of top-level
/// entity ids. Maps are kept sorted so that normalization is byte-stable:
/// validating an already-normalized schema re-serializes identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// All entities in the tree, keyed by id
    #[serde(default)]
    pub entities: BTreeMap<EntityId, SchemaEntity>,

    /// Ordered ids of the top-level entities
    #[serde(default)]
    pub root: Vec<EntityId>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entity by id
    #[inline]
    pub fn entity(&self, id: &EntityId) -> Option<&SchemaEntity> {
        self.entities.get(id)
    }

    /// Whether the schema contains an entity with the given id
    #[inline]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    /// Ids of every descendant of `id`, depth-first, children before their
    /// own descendants. Does not include `id` itself.
    pub fn descendants(&self, id: &EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut stack: Vec<EntityId> = match self.entity(id) {
            Some(entity) => entity.children_ids().iter().rev().cloned().collect(),
            None => return result,
        };

        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            // A consistent schema has no repeated ids; the guard keeps the
            // walk terminating on inconsistent input.
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(entity) = self.entity(&current) {
                for child in entity.children_ids().iter().rev() {
                    stack.push(child.clone());
                }
            }
            result.push(current);
        }
        result
    }

    /// Ids of every ancestor of `id`, nearest first. Does not include `id`
    /// itself. Stops if a parent chain loops back on itself.
    pub fn ancestors(&self, id: &EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(id.clone());

        let mut current = self.entity(id).and_then(|e| e.parent_id.clone());
        while let Some(ancestor) = current {
            if !seen.insert(ancestor.clone()) {
                break;
            }
            current = self.entity(&ancestor).and_then(|e| e.parent_id.clone());
            result.push(ancestor);
        }
        result
    }

    /// Whether `candidate` is a descendant of `of`
    pub fn is_descendant(&self, candidate: &EntityId, of: &EntityId) -> bool {
        self.ancestors(candidate).contains(of)
    }

    /// Depth-first traversal order over the whole tree, starting from `root`
    pub fn traversal_order(&self) -> Vec<EntityId> {
        let mut result = Vec::new();
        for id in &self.root {
            if self.contains(id) {
                result.push(id.clone());
                result.extend(self.descendants(id));
            }
        }
        result
    }
}
