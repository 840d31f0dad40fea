use crate::definition::entity::EntityDefinition;
use crate::identifier::{EntityIdentifier, UuidIdentifier};
use crate::model::EntityId;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Which child types an entity type accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildrenAllowed {
    /// Any registered entity type may be a child
    Any,
    /// Only the listed entity types may be children
    Types(BTreeSet<String>),
}

impl ChildrenAllowed {
    /// Whether a child of the given type is accepted
    pub fn allows(&self, child_type: &str) -> bool {
        match self {
            ChildrenAllowed::Any => true,
            ChildrenAllowed::Types(types) => types.contains(child_type),
        }
    }
}

/// The registry of entity types and structural rules used to validate and
/// construct schemas.
///
/// Types with no `children_allowed` entry may not have children at all;
/// types in `parent_required` must always sit under a parent.
#[derive(Clone)]
pub struct BuilderDefinition {
    entities: BTreeMap<String, EntityDefinition>,
    children_allowed: BTreeMap<String, ChildrenAllowed>,
    parent_required: BTreeSet<String>,
    identifier: Arc<dyn EntityIdentifier>,
}

impl Default for BuilderDefinition {
    fn default() -> Self {
        Self::new()
    }
}

impl BuilderDefinition {
    /// Create an empty builder definition with the UUID identifier provider
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            children_allowed: BTreeMap::new(),
            parent_required: BTreeSet::new(),
            identifier: Arc::new(UuidIdentifier),
        }
    }

    /// Register an entity definition, replacing any previous one of the same
    /// name
    pub fn with_entity(mut self, entity: EntityDefinition) -> Self {
        self.entities.insert(entity.name().to_string(), entity);
        self
    }

    /// Allow the given parent type to contain children of any type
    pub fn allow_any_children(mut self, parent_type: impl Into<String>) -> Self {
        self.children_allowed
            .insert(parent_type.into(), ChildrenAllowed::Any);
        self
    }

    /// Allow the given parent type to contain children of the listed types
    pub fn allow_children<I, S>(mut self, parent_type: impl Into<String>, child_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children_allowed.insert(
            parent_type.into(),
            ChildrenAllowed::Types(child_types.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Require entities of the given type to always have a parent
    pub fn require_parent(mut self, entity_type: impl Into<String>) -> Self {
        self.parent_required.insert(entity_type.into());
        self
    }

    /// Replace the identifier provider
    pub fn with_identifier(mut self, identifier: impl EntityIdentifier + 'static) -> Self {
        self.identifier = Arc::new(identifier);
        self
    }

    /// Look up a registered entity definition
    pub fn entity(&self, name: &str) -> Option<&EntityDefinition> {
        self.entities.get(name)
    }

    /// Whether an entity type is registered
    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Iterate over all registered entity definitions
    pub fn entity_definitions(&self) -> impl Iterator<Item = &EntityDefinition> {
        self.entities.values()
    }

    /// Whether the given parent type may have children at all
    pub fn allows_children(&self, parent_type: &str) -> bool {
        self.children_allowed.contains_key(parent_type)
    }

    /// Whether a child of `child_type` may sit under a parent of
    /// `parent_type`
    pub fn is_child_allowed(&self, parent_type: &str, child_type: &str) -> bool {
        self.children_allowed
            .get(parent_type)
            .map(|allowed| allowed.allows(child_type))
            .unwrap_or(false)
    }

    /// Whether entities of the given type must have a parent
    pub fn requires_parent(&self, entity_type: &str) -> bool {
        self.parent_required.contains(entity_type)
    }

    /// Generate a fresh entity id with the identifier provider
    pub fn generate_entity_id(&self) -> EntityId {
        EntityId(self.identifier.generate())
    }

    /// Check an id against the identifier provider's format rules
    pub fn validate_entity_id(&self, id: &EntityId) -> bool {
        self.identifier.validate(id.as_str())
    }
}

impl fmt::Debug for BuilderDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderDefinition")
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("children_allowed", &self.children_allowed)
            .field("parent_required", &self.parent_required)
            .finish_non_exhaustive()
    }
}
