//! Strongly-typed identifiers used across the domain.
//!
//! All identifiers are UUID newtypes. `GarageId` is the tenant key: event
//! streams, read-model rows and stored documents are all partitioned by it,
//! and nothing crosses that partition.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh identifier (UUIDv7, time-ordered). Tests that
            /// need determinism should construct from a fixed UUID instead.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {e}", stringify!($name))))
            }
        }
    };
}

uuid_id!(
    /// Tenant key. Everything a garage owns hangs off this id.
    GarageId
);
uuid_id!(
    /// Resolved caller identity (an actor, not an aggregate).
    UserId
);
uuid_id!(
    /// Stream identifier of an event-sourced aggregate.
    AggregateId
);

/// A garage's own profile stream uses the tenant key as its aggregate id.
impl From<GarageId> for AggregateId {
    fn from(value: GarageId) -> Self {
        Self(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_id_type() {
        let err = GarageId::from_str("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("GarageId"));
    }

    #[test]
    fn garage_id_aliases_its_own_aggregate_stream() {
        let garage_id = GarageId::new();
        assert_eq!(AggregateId::from(garage_id).as_uuid(), garage_id.as_uuid());
    }
}
