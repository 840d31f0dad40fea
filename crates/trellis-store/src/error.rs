use thiserror::Error;
use trellis_schema::{EntityId, SchemaError};

/// Stable machine-readable store error codes
pub mod codes {
    /// Referenced entity does not exist in the store's schema
    pub const ENTITY_NOT_FOUND: &str = "ERR_STORE_ENTITY_NOT_FOUND";

    /// Attribute name is not declared for the entity's type
    pub const UNKNOWN_ATTRIBUTE: &str = "ERR_STORE_UNKNOWN_ATTRIBUTE";

    /// Entity type does not track a runtime value
    pub const VALUE_NOT_ALLOWED: &str = "ERR_STORE_VALUE_NOT_ALLOWED";

    /// Generated entity id collides with an existing one
    pub const ID_COLLISION: &str = "ERR_STORE_ID_COLLISION";

    /// Identifier provider produced an id that fails its own format check
    pub const INVALID_GENERATED_ID: &str = "ERR_STORE_INVALID_GENERATED_ID";
}

/// Failures raised by store operations.
///
/// Operations validate before they mutate: when one of these is returned the
/// store state is exactly what it was before the call. Async validation
/// failures are not errors; they are stored as data and emitted as events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The mutation would leave the schema in an inconsistent state
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A referenced entity does not exist
    #[error("Entity not found: {id}")]
    EntityNotFound {
        /// The unknown id
        id: EntityId,
    },

    /// An attribute name is not declared for the entity's type
    #[error("Unknown attribute '{attribute}' for entity {id} of type '{entity_type}'")]
    UnknownAttribute {
        /// The owning entity
        id: EntityId,
        /// The entity's type
        entity_type: String,
        /// The undeclared attribute name
        attribute: String,
    },

    /// The entity's type has no value validator
    #[error("Entity {id} of type '{entity_type}' does not track a value")]
    ValueNotAllowed {
        /// The offending entity
        id: EntityId,
        /// The value-disallowed type
        entity_type: String,
    },

    /// A freshly generated id is already in use
    #[error("Generated entity id {id} is already in use")]
    IdCollision {
        /// The colliding id
        id: EntityId,
    },

    /// The identifier provider generated an id its own validator rejects
    #[error("Generated entity id {id} fails the identifier format check")]
    InvalidGeneratedId {
        /// The malformed id
        id: EntityId,
    },
}

impl StoreError {
    /// Get the stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Schema(err) => err.error_code(),
            StoreError::EntityNotFound { .. } => codes::ENTITY_NOT_FOUND,
            StoreError::UnknownAttribute { .. } => codes::UNKNOWN_ATTRIBUTE,
            StoreError::ValueNotAllowed { .. } => codes::VALUE_NOT_ALLOWED,
            StoreError::IdCollision { .. } => codes::ID_COLLISION,
            StoreError::InvalidGeneratedId { .. } => codes::INVALID_GENERATED_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::EntityNotFound { id: "e-1".into() };
        assert_eq!(error.to_string(), "Entity not found: e-1");

        let error = StoreError::ValueNotAllowed {
            id: "e-1".into(),
            entity_type: "section".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Entity e-1 of type 'section' does not track a value"
        );
    }

    #[test]
    fn test_schema_errors_keep_their_code() {
        let error: StoreError = SchemaError::SelfReference { id: "e-1".into() }.into();
        assert_eq!(error.error_code(), "ERR_SCHEMA_SELF_REFERENCE");
        assert_eq!(error.to_string(), "Entity e-1 references itself");
    }

    #[test]
    fn test_store_error_codes_are_stable() {
        assert_eq!(
            StoreError::IdCollision { id: "x".into() }.error_code(),
            "ERR_STORE_ID_COLLISION"
        );
        assert_eq!(
            StoreError::UnknownAttribute {
                id: "x".into(),
                entity_type: "text".to_string(),
                attribute: "nope".to_string(),
            }
            .error_code(),
            "ERR_STORE_UNKNOWN_ATTRIBUTE"
        );
    }
}
