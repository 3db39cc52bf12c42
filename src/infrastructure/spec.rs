//! Table-driven attribute classification for child doubles.

use crate::application::ports::SpecClassifier;
use std::collections::BTreeMap;

/// Describes the attributes of a real object.
///
/// Listed attributes are either plain or deferred-result shaped. A strict
/// spec rejects every attribute it does not list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSpec {
    attributes: BTreeMap<String, bool>,
    strict: bool,
}

impl AttributeSpec {
    /// Create an empty, permissive spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// List an attribute that returns its result directly.
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), false);
        self
    }

    /// List an attribute that returns a deferred result.
    pub fn deferred_attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), true);
        self
    }

    /// Reject attributes that are not listed.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Listed attribute names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}

impl SpecClassifier for AttributeSpec {
    fn is_deferred(&self, attribute: &str) -> bool {
        self.attributes.get(attribute).copied().unwrap_or(false)
    }

    fn has_attribute(&self, attribute: &str) -> bool {
        !self.strict || self.attributes.contains_key(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let spec = AttributeSpec::new()
            .attribute("close")
            .deferred_attribute("fetch");

        assert!(spec.is_deferred("fetch"));
        assert!(!spec.is_deferred("close"));
        assert!(!spec.is_deferred("unknown"));
        assert!(spec.has_attribute("unknown"));
        assert_eq!(spec.names().collect::<Vec<_>>(), ["close", "fetch"]);
    }

    #[test]
    fn test_strict_rejects_unlisted() {
        let spec = AttributeSpec::new().attribute("close").strict();
        assert!(spec.has_attribute("close"));
        assert!(!spec.has_attribute("fetch"));
    }
}
