use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for an aggregate instance.
    ///
    /// Wraps a UUID to provide type safety and prevent mixing up
    /// aggregate IDs with other UUID-based identifiers.
    AggregateId
}

uuid_id! {
    /// Organization (tenant) identifier, carried on every stored event and
    /// outbound notification for multi-tenant routing.
    OrgId
}

uuid_id! {
    /// Site (restaurant location) identifier within an organization.
    SiteId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn aggregate_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = AggregateId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn ids_of_different_kinds_are_distinct_types() {
        // Compile-time property; the assertions just exercise the conversions.
        let uuid = Uuid::new_v4();
        let org = OrgId::from_uuid(uuid);
        let site = SiteId::from_uuid(uuid);
        assert_eq!(org.as_uuid(), site.as_uuid());
    }

    #[test]
    fn serialization_roundtrip() {
        let id = OrgId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: OrgId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
