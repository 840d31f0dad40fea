use crate::definition::attribute::AttributeDefinition;
use crate::model::{EntityId, SchemaEntity};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Context handed to entity-level callbacks: value validation, default
/// computation, and the eligibility predicate.
///
/// `entities_values` maps entity ids to their current runtime value; a key
/// mapped to `None` models a present-but-unset value, an absent key models an
/// entity with no value slot at all.
#[derive(Debug, Clone)]
pub struct EntityContext {
    /// Id of the entity being evaluated
    pub entity_id: EntityId,
    /// Snapshot of the entity being evaluated
    pub entity: SchemaEntity,
    /// Snapshot of the runtime values of all entities
    pub entities_values: HashMap<EntityId, Option<Value>>,
}

/// Value validation function attached to an entity definition.
///
/// Supplying one makes the entity type value-allowed: the interpreter store
/// will track a value for entities of this type.
pub type EntityValidateFn =
    Arc<dyn Fn(Option<Value>, EntityContext) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Default value computation for a value-allowed entity
pub type DefaultValueFn = Arc<dyn Fn(&EntityContext) -> Option<Value> + Send + Sync>;

/// Eligibility predicate: whether the entity (and its subtree) participates
/// in value collection and validation
pub type ShouldProcessFn = Arc<dyn Fn(&EntityContext) -> bool + Send + Sync>;

/// A typed node descriptor: attributes plus optional runtime-value behavior.
#[derive(Clone)]
pub struct EntityDefinition {
    name: String,
    attributes: Vec<AttributeDefinition>,
    validate: Option<EntityValidateFn>,
    default_value: Option<DefaultValueFn>,
    should_be_processed: Option<ShouldProcessFn>,
}

impl EntityDefinition {
    /// Create an entity definition with no attributes and no value behavior
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            validate: None,
            default_value: None,
            should_be_processed: None,
        }
    }

    /// Attach an attribute definition
    pub fn with_attribute(mut self, attribute: AttributeDefinition) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Attach an asynchronous value validator, making the type value-allowed
    pub fn with_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(Option<Value>, EntityContext) -> BoxFuture<'static, Result<Value, String>>
            + Send
            + Sync
            + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Attach a synchronous value validator, making the type value-allowed
    pub fn with_sync_validator<F>(self, validate: F) -> Self
    where
        F: Fn(Option<Value>, EntityContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        let validate = Arc::new(validate);
        self.with_validator(move |value, context| {
            let validate = Arc::clone(&validate);
            Box::pin(async move { validate(value, context) })
        })
    }

    /// Attach a default value computation
    pub fn with_default_value<F>(mut self, default_value: F) -> Self
    where
        F: Fn(&EntityContext) -> Option<Value> + Send + Sync + 'static,
    {
        self.default_value = Some(Arc::new(default_value));
        self
    }

    /// Attach an eligibility predicate (entities are processed by default)
    pub fn with_should_be_processed<F>(mut self, should_be_processed: F) -> Self
    where
        F: Fn(&EntityContext) -> bool + Send + Sync + 'static,
    {
        self.should_be_processed = Some(Arc::new(should_be_processed));
        self
    }

    /// The entity type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All declared attribute definitions
    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    /// Look up a declared attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Whether an attribute with the given name is declared
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// True iff a value validator was supplied
    pub fn is_value_allowed(&self) -> bool {
        self.validate.is_some()
    }

    /// Compute the default value, `None` when no computation was supplied or
    /// the computation yields nothing
    pub fn default_value(&self, context: &EntityContext) -> Option<Value> {
        self.default_value.as_ref().and_then(|f| f(context))
    }

    /// Evaluate the eligibility predicate; `true` when none was supplied
    pub fn should_be_processed(&self, context: &EntityContext) -> bool {
        self.should_be_processed
            .as_ref()
            .map(|f| f(context))
            .unwrap_or(true)
    }

    /// Run the value validator.
    ///
    /// Returns an error for value-disallowed types: callers are expected to
    /// gate on [`EntityDefinition::is_value_allowed`] first.
    pub async fn validate_value(
        &self,
        value: Option<Value>,
        context: EntityContext,
    ) -> Result<Value, String> {
        match &self.validate {
            Some(validate) => validate(value, context).await,
            None => Err(format!("entity type '{}' does not allow a value", self.name)),
        }
    }
}

impl fmt::Debug for EntityDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDefinition")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("is_value_allowed", &self.is_value_allowed())
            .finish_non_exhaustive()
    }
}
