//! # Trellis Schema
//!
//! The declarative layer of the Trellis engine: typed entity and attribute
//! definitions, the serializable schema tree, and the integrity validation
//! that keeps a schema consistent with its builder definition.
//!
//! A [`BuilderDefinition`] registers entity types (each with attribute
//! definitions and optional runtime-value behavior) together with structural
//! rules: which types may contain which children, which types require a
//! parent, and how entity ids are generated and checked.
//!
//! ## Example
//!
//! ```
//! use trellis_schema::{
//!     validate_schema, AttributeDefinition, BuilderDefinition, EntityDefinition, Schema,
//!     SchemaEntity,
//! };
//!
//! let builder = BuilderDefinition::new()
//!     .with_entity(
//!         EntityDefinition::new("text")
//!             .with_attribute(AttributeDefinition::sync("label", |value, _context| {
//!                 value.ok_or_else(|| "label is required".to_string())
//!             }))
//!             .with_sync_validator(|value, _context| {
//!                 value.ok_or_else(|| "value is required".to_string())
//!             }),
//!     )
//!     .with_entity(EntityDefinition::new("section"))
//!     .allow_children("section", ["text"]);
//!
//! let mut schema = Schema::new();
//! let id = builder.generate_entity_id();
//! schema.entities.insert(
//!     id.clone(),
//!     SchemaEntity::new("text").with_attribute("label", "First name".into()),
//! );
//! schema.root = vec![id];
//!
//! assert!(validate_schema(&schema, &builder).is_ok());
//! ```

mod error;
mod identifier;
mod model;

pub mod definition;
pub mod validation;

pub use definition::{
    AttributeContext, AttributeDefinition, AttributeValidateFn, BuilderDefinition,
    ChildrenAllowed, DefaultValueFn, EntityContext, EntityDefinition, EntityValidateFn,
    ShouldProcessFn,
};
pub use error::SchemaError;
pub use identifier::{EntityIdentifier, UuidIdentifier};
pub use model::{EntityId, Schema, SchemaEntity};
pub use validation::{validate_schema, validate_schema_value};

/// Returns a version string for the Trellis schema crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
