//! Opaque peer identifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, comparable, hashable node identifier.
///
/// Serialized on the wire as a length-prefixed UTF-8 string (see
/// [`crate::codec`]). Never empty — constructors reject an empty string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Build a `NodeId` from any string-like value.
    ///
    /// # Panics
    ///
    /// Panics if `value` is empty — callers at the system boundary (codec,
    /// config) should validate first and surface a proper error instead of
    /// hitting this panic.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        assert!(!value.is_empty(), "NodeId must not be empty");
        Self(value)
    }

    /// Fallible constructor for boundary code that must not panic.
    pub fn try_new(value: impl Into<String>) -> Result<Self, &'static str> {
        let value = value.into();
        if value.is_empty() {
            Err("NodeId must not be empty")
        } else {
            Ok(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(NodeId::try_new("").is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        assert!(a < b);
    }

    #[test]
    fn displays_inner_string() {
        let id = NodeId::new("node-7");
        assert_eq!(id.to_string(), "node-7");
    }
}
