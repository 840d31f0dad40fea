use uuid::Uuid;

/// Identifier provider for schema entities.
///
/// A builder definition carries one of these; the builder store uses it to
/// mint ids for new entities and the integrity validator uses it to check
/// ids arriving in serialized schemas.
pub trait EntityIdentifier: Send + Sync {
    /// Generate a fresh identifier
    fn generate(&self) -> String;

    /// Whether `id` is a well-formed identifier for this provider
    fn validate(&self, id: &str) -> bool;
}

/// Default identifier provider backed by UUID v4
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdentifier;

impl EntityIdentifier for UuidIdentifier {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn validate(&self, id: &str) -> bool {
        Uuid::parse_str(id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid_and_unique() {
        let identifier = UuidIdentifier;
        let first = identifier.generate();
        let second = identifier.generate();

        assert_ne!(first, second);
        assert!(identifier.validate(&first));
        assert!(identifier.validate(&second));
    }

    #[test]
    fn test_rejects_malformed_ids() {
        let identifier = UuidIdentifier;
        assert!(!identifier.validate(""));
        assert!(!identifier.validate("not-a-uuid"));
        assert!(!identifier.validate("123e4567-e89b-12d3-a456"));
    }
}
