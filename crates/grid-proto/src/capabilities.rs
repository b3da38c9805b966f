//! Capability property bags and the compatibility matcher.
//!
//! A `Capabilities` value describes either what a worker slot offers (its
//! stereotype) or what a client requests. Compatibility is deliberately
//! asymmetric: every requested key must be present in the stereotype with
//! an equal value, while extra stereotype keys are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// A single capability value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilityValue {
    /// String value (e.g. a browser name).
    Str(String),
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Explicit null.
    Null,
}

impl From<&str> for CapabilityValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for CapabilityValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for CapabilityValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CapabilityValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for CapabilityValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl fmt::Display for CapabilityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// An ordered property bag describing a browser/environment configuration.
///
/// Serializes as a plain JSON object. Key order is deterministic
/// (lexicographic) so serialized forms are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    entries: BTreeMap<String, CapabilityValue>,
}

impl Capabilities {
    /// Create an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, returning the updated set (builder style).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<CapabilityValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Look up a property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CapabilityValue> {
        self.entries.get(key)
    }

    /// Whether the property is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CapabilityValue)> {
        self.entries.iter()
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Pluggable compatibility policy between a requested capability set and a
/// slot stereotype.
///
/// Implementations must be pure: no side effects, no mutation of either
/// argument.
pub trait CapabilityMatcher: Send + Sync + fmt::Debug {
    /// Whether `stereotype` can satisfy `requested`.
    fn matches(&self, stereotype: &Capabilities, requested: &Capabilities) -> bool;
}

/// Default policy: exact equality per requested key.
///
/// Every key present in the request must exist in the stereotype with an
/// equal value; a requested key absent from the stereotype fails the match.
/// Stereotype keys that were not requested are ignored, so a request with
/// fewer keys than a capability-rich stereotype always matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatcher;

impl CapabilityMatcher for ExactMatcher {
    fn matches(&self, stereotype: &Capabilities, requested: &Capabilities) -> bool {
        requested
            .iter()
            .all(|(key, value)| stereotype.get(key) == Some(value))
    }
}

/// Resolve a capability matcher by configured name.
///
/// # Errors
///
/// Returns an error if the name does not correspond to a known matcher.
pub fn matcher_from_name(name: &str) -> Result<Arc<dyn CapabilityMatcher>, ProtoError> {
    match name {
        "exact" => Ok(Arc::new(ExactMatcher)),
        other => Err(ProtoError::UnknownPlugin {
            kind: "capability matcher",
            name: other.to_string(),
        }),
    }
}
