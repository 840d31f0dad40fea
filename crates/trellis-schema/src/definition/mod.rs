//! Declarative descriptors supplied by application code.
//!
//! An [`AttributeDefinition`] describes one named, independently validated
//! configuration value. An [`EntityDefinition`] aggregates attributes with
//! optional value validation, default computation, and an eligibility
//! predicate. A [`BuilderDefinition`] is the registry of entity types plus
//! the structural rules a schema must satisfy.

mod attribute;
mod builder;
mod entity;

pub use attribute::{AttributeContext, AttributeDefinition, AttributeValidateFn};
pub use builder::{BuilderDefinition, ChildrenAllowed};
pub use entity::{
    DefaultValueFn, EntityContext, EntityDefinition, EntityValidateFn, ShouldProcessFn,
};
