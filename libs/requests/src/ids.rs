//! Typed IDs for requests and requesters.
//!
//! Both IDs are plain 128-bit UUIDs on the wire. The newtypes exist to keep
//! the two namespaces from being mixed up in signatures: a request ID names
//! one resource request, a requester ID names the party that created it.

/// Macro to define a UUID-backed typed ID.
///
/// Generates a newtype wrapper around `uuid::Uuid` with:
/// - `random()` to generate a fresh v4 ID
/// - `from_uuid()` / `as_uuid()` conversions
/// - `Display` and `FromStr` using the canonical hyphenated form
/// - `Serialize` and `Deserialize` delegating to the inner UUID
/// - `Ord`, `Hash`, and other standard traits
macro_rules! define_uuid_id {
    ($name:ident) => {
        /// A typed 128-bit identifier.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Generates a fresh random (v4) ID.
            #[must_use]
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> uuid::Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Ok(Self(uuid::Uuid::deserialize(deserializer)?))
            }
        }
    };
}

define_uuid_id!(RequestId);
define_uuid_id!(RequesterId);
