//! Resource descriptors and the wildcard matcher.
//!
//! A requester describes what it wants with a [`ResourceDescriptor`]: five
//! fields, each either an exact value or the wildcard `Any`. A scheduler
//! answers with a concrete [`Resource`], which carries plain strings only —
//! wildcards cannot appear on the granted side by construction.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wildcard sentinel used in the wire representation of descriptor fields.
pub const WILDCARD: &str = "*";

/// One field of a resource descriptor: an exact value or "any".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPattern {
    /// Matches any concrete value.
    Any,
    /// Matches exactly this value.
    Exact(String),
}

impl FieldPattern {
    /// Returns true if this pattern accepts the concrete value.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(want) => want == value,
        }
    }

    /// Returns true if this pattern is the wildcard.
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl From<&str> for FieldPattern {
    fn from(s: &str) -> Self {
        if s == WILDCARD {
            Self::Any
        } else {
            Self::Exact(s.to_string())
        }
    }
}

impl From<String> for FieldPattern {
    fn from(s: String) -> Self {
        if s == WILDCARD {
            Self::Any
        } else {
            Self::Exact(s)
        }
    }
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "{}", WILDCARD),
            Self::Exact(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for FieldPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Any => serializer.serialize_str(WILDCARD),
            Self::Exact(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for FieldPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s))
    }
}

/// A possibly-wildcarded description of a desired resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Operating system (e.g. "linux").
    pub os: FieldPattern,
    /// OS version or release name.
    pub version: FieldPattern,
    /// Platform family (e.g. "ros").
    pub system: FieldPattern,
    /// Platform instance type (e.g. "segbot").
    pub platform: FieldPattern,
    /// Individual resource name.
    pub name: FieldPattern,
}

impl ResourceDescriptor {
    /// Builds a descriptor from the five fields. `"*"` in any position
    /// becomes the wildcard.
    pub fn new(
        os: impl Into<FieldPattern>,
        version: impl Into<FieldPattern>,
        system: impl Into<FieldPattern>,
        platform: impl Into<FieldPattern>,
        name: impl Into<FieldPattern>,
    ) -> Self {
        Self {
            os: os.into(),
            version: version.into(),
            system: system.into(),
            platform: platform.into(),
            name: name.into(),
        }
    }

    /// Checks whether a concrete resource satisfies this descriptor.
    ///
    /// Every field must equal the concrete value unless the descriptor field
    /// is the wildcard, which always matches.
    pub fn matches(&self, resource: &Resource) -> bool {
        self.os.accepts(&resource.os)
            && self.version.accepts(&resource.version)
            && self.system.accepts(&resource.system)
            && self.platform.accepts(&resource.platform)
            && self.name.accepts(&resource.name)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.os, self.version, self.system, self.platform, self.name
        )
    }
}

/// A concrete resource, as granted by a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Operating system (e.g. "linux").
    pub os: String,
    /// OS version or release name.
    pub version: String,
    /// Platform family (e.g. "ros").
    pub system: String,
    /// Platform instance type (e.g. "segbot").
    pub platform: String,
    /// Individual resource name.
    pub name: String,
}

impl Resource {
    /// Builds a concrete resource from the five fields.
    pub fn new(
        os: impl Into<String>,
        version: impl Into<String>,
        system: impl Into<String>,
        platform: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            os: os.into(),
            version: version.into(),
            system: system.into(),
            platform: platform.into(),
            name: name.into(),
        }
    }

    /// Canonical dotted name, unique per resource within a deployment.
    ///
    /// Used as the pool key and in log output.
    pub fn canonical_name(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}",
            self.os, self.version, self.system, self.platform, self.name
        )
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

impl From<&Resource> for ResourceDescriptor {
    /// An exact descriptor that matches only this resource.
    fn from(resource: &Resource) -> Self {
        Self {
            os: FieldPattern::Exact(resource.os.clone()),
            version: FieldPattern::Exact(resource.version.clone()),
            system: FieldPattern::Exact(resource.system.clone()),
            platform: FieldPattern::Exact(resource.platform.clone()),
            name: FieldPattern::Exact(resource.name.clone()),
        }
    }
}
