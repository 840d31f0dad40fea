use crate::model::{EntityId, Schema, SchemaEntity};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Context handed to an attribute validator.
///
/// Holds owned snapshots so the validator can suspend without borrowing store
/// state; the store never holds a lock while a validator runs.
#[derive(Debug, Clone)]
pub struct AttributeContext {
    /// Snapshot of the whole schema at validation time
    pub schema: Schema,
    /// Id of the entity owning the attribute
    pub entity_id: EntityId,
    /// Snapshot of the owning entity
    pub entity: SchemaEntity,
}

/// Validation function attached to an attribute definition.
///
/// Receives the raw stored value (`None` when the attribute is unset) and
/// returns the validated value or an error message. Optionality is the
/// validator's own concern: an optional attribute accepts `None`.
pub type AttributeValidateFn =
    Arc<dyn Fn(Option<Value>, AttributeContext) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// A named, independently validated configuration value attached to an
/// entity definition (e.g. a field's label).
#[derive(Clone)]
pub struct AttributeDefinition {
    name: String,
    validate: AttributeValidateFn,
}

impl AttributeDefinition {
    /// Create an attribute definition with an asynchronous validator
    pub fn new<F>(name: impl Into<String>, validate: F) -> Self
    where
        F: Fn(Option<Value>, AttributeContext) -> BoxFuture<'static, Result<Value, String>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            validate: Arc::new(validate),
        }
    }

    /// Create an attribute definition with a synchronous validator
    pub fn sync<F>(name: impl Into<String>, validate: F) -> Self
    where
        F: Fn(Option<Value>, AttributeContext) -> Result<Value, String> + Send + Sync + 'static,
    {
        let validate = Arc::new(validate);
        Self::new(name, move |value, context| {
            let validate = Arc::clone(&validate);
            Box::pin(async move { validate(value, context) })
        })
    }

    /// The attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the validator against a raw value
    pub async fn validate(
        &self,
        value: Option<Value>,
        context: AttributeContext,
    ) -> Result<Value, String> {
        (self.validate)(value, context).await
    }
}

impl fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
