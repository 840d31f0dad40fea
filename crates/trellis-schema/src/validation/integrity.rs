use crate::definition::BuilderDefinition;
use crate::error::SchemaError;
use crate::model::{EntityId, Schema, SchemaEntity};
use std::collections::HashSet;

/// Runs the full set of integrity invariants over a schema, fail-fast.
///
/// Check order is deterministic: root shape, per-entity checks in id order,
/// ancestor cycles, then reachability. The first provable violation wins.
pub(crate) struct IntegrityChecker<'a> {
    schema: &'a Schema,
    builder: &'a BuilderDefinition,
}

impl<'a> IntegrityChecker<'a> {
    pub(crate) fn new(schema: &'a Schema, builder: &'a BuilderDefinition) -> Self {
        Self { schema, builder }
    }

    pub(crate) fn check(&self) -> Result<Schema, SchemaError> {
        self.check_root()?;

        for (id, entity) in &self.schema.entities {
            self.check_entity(id, entity)?;
        }

        self.check_cycles()?;
        self.check_reachability()?;

        Ok(self.normalized())
    }

    fn check_root(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for id in &self.schema.root {
            if !seen.insert(id) {
                return Err(SchemaError::DuplicateRootId { id: id.clone() });
            }
        }

        if self.schema.root.is_empty() && !self.schema.entities.is_empty() {
            return Err(SchemaError::EmptyRoot);
        }

        for id in &self.schema.root {
            let entity = self
                .schema
                .entity(id)
                .ok_or_else(|| SchemaError::NonexistentEntityId { id: id.clone() })?;
            if entity.parent_id.is_some() {
                return Err(SchemaError::RootEntityWithParent { id: id.clone() });
            }
        }

        Ok(())
    }

    fn check_entity(&self, id: &EntityId, entity: &SchemaEntity) -> Result<(), SchemaError> {
        if !self.builder.validate_entity_id(id) {
            return Err(SchemaError::InvalidEntityId { id: id.0.clone() });
        }

        let definition = self.builder.entity(&entity.entity_type).ok_or_else(|| {
            SchemaError::UnknownEntityType {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
            }
        })?;

        for attribute in entity.attributes.keys() {
            if !definition.has_attribute(attribute) {
                return Err(SchemaError::UnknownAttribute {
                    id: id.clone(),
                    entity_type: entity.entity_type.clone(),
                    attribute: attribute.clone(),
                });
            }
        }

        self.check_parent(id, entity)?;
        self.check_children(id, entity)?;

        if self.builder.requires_parent(&entity.entity_type) && entity.parent_id.is_none() {
            return Err(SchemaError::ParentRequired {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
            });
        }

        Ok(())
    }

    fn check_parent(&self, id: &EntityId, entity: &SchemaEntity) -> Result<(), SchemaError> {
        let Some(parent_id) = &entity.parent_id else {
            return Ok(());
        };

        if parent_id == id {
            return Err(SchemaError::SelfReference { id: id.clone() });
        }

        let parent = self
            .schema
            .entity(parent_id)
            .ok_or_else(|| SchemaError::NonexistentEntityId {
                id: parent_id.clone(),
            })?;

        if !parent.children_ids().contains(id) {
            return Err(SchemaError::ParentChildMismatch {
                id: id.clone(),
                parent_id: parent_id.clone(),
            });
        }

        Ok(())
    }

    fn check_children(&self, id: &EntityId, entity: &SchemaEntity) -> Result<(), SchemaError> {
        let Some(children) = &entity.children else {
            return Ok(());
        };

        if !self.builder.allows_children(&entity.entity_type) {
            return Err(SchemaError::ChildrenNotAllowed {
                id: id.clone(),
                entity_type: entity.entity_type.clone(),
            });
        }

        let mut seen = HashSet::new();
        for child_id in children {
            if child_id == id {
                return Err(SchemaError::SelfReference { id: id.clone() });
            }
            if !seen.insert(child_id) {
                return Err(SchemaError::DuplicateChildId {
                    id: id.clone(),
                    child_id: child_id.clone(),
                });
            }

            let child = self
                .schema
                .entity(child_id)
                .ok_or_else(|| SchemaError::NonexistentEntityId {
                    id: child_id.clone(),
                })?;

            if !self
                .builder
                .is_child_allowed(&entity.entity_type, &child.entity_type)
            {
                return Err(SchemaError::ChildNotAllowed {
                    id: id.clone(),
                    entity_type: entity.entity_type.clone(),
                    child_id: child_id.clone(),
                    child_type: child.entity_type.clone(),
                });
            }

            if child.parent_id.as_ref() != Some(id) {
                return Err(SchemaError::ChildParentMismatch {
                    id: id.clone(),
                    child_id: child_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// No entity may be its own ancestor. Walks each parent chain with a
    /// per-walk seen set so inconsistent input cannot loop forever.
    fn check_cycles(&self) -> Result<(), SchemaError> {
        for id in self.schema.entities.keys() {
            let mut seen = HashSet::new();
            seen.insert(id);

            let mut current = self.schema.entity(id).and_then(|e| e.parent_id.as_ref());
            while let Some(ancestor) = current {
                if ancestor == id {
                    return Err(SchemaError::CircularReference { id: id.clone() });
                }
                if !seen.insert(ancestor) {
                    break;
                }
                current = self
                    .schema
                    .entity(ancestor)
                    .and_then(|e| e.parent_id.as_ref());
            }
        }
        Ok(())
    }

    /// Every entity must be reachable from the root through children links.
    fn check_reachability(&self) -> Result<(), SchemaError> {
        let mut visited = HashSet::new();
        let mut stack: Vec<&EntityId> = self.schema.root.iter().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(entity) = self.schema.entity(id) {
                stack.extend(entity.children_ids().iter());
            }
        }

        for id in self.schema.entities.keys() {
            if !visited.contains(id) {
                return Err(SchemaError::UnreachableEntity { id: id.clone() });
            }
        }

        Ok(())
    }

    /// Rebuild the schema keeping only the validated fields.
    fn normalized(&self) -> Schema {
        let entities = self
            .schema
            .entities
            .iter()
            .map(|(id, entity)| {
                (
                    id.clone(),
                    SchemaEntity {
                        entity_type: entity.entity_type.clone(),
                        attributes: entity.attributes.clone(),
                        parent_id: entity.parent_id.clone(),
                        children: entity.children.clone(),
                    },
                )
            })
            .collect();

        Schema {
            entities,
            root: self.schema.root.clone(),
        }
    }
}
