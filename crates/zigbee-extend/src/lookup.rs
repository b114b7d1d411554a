//! Bidirectional name/value lookup over an ordered table

use crate::error::ExtendError;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered enum table mapping exposed names to wire values.
///
/// Names are matched exactly first, then case-insensitively. When several
/// names share one wire value, `name_of` returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    entries: Vec<(String, i64)>,
}

impl Lookup {
    #[must_use]
    pub fn new(entries: &[(&str, i64)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, value)| ((*name).to_string(), *value))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| self.entries.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)))
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }

    /// Names in table order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Wire value for `name`, or an invalid-value error listing the allowed names
    pub fn require_value(&self, key: &str, name: &str) -> Result<i64, ExtendError> {
        self.value_of(name).ok_or_else(|| {
            ExtendError::invalid_value(
                key,
                format!("'{name}' is not one of {}", self.names().join(", ")),
            )
        })
    }
}

impl Serialize for Lookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct LookupVisitor;

impl<'de> Visitor<'de> for LookupVisitor {
    type Value = Lookup;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of names to integer values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Lookup, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, i64>()? {
            entries.push((name, value));
        }
        Ok(Lookup { entries })
    }
}

impl<'de> Deserialize<'de> for Lookup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LookupVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_on() -> Lookup {
        Lookup::new(&[("off", 0), ("on", 1), ("toggle", 2), ("previous", 255)])
    }

    #[test]
    fn test_both_directions() {
        let lookup = power_on();
        assert_eq!(lookup.value_of("previous"), Some(255));
        assert_eq!(lookup.value_of("Toggle"), Some(2));
        assert_eq!(lookup.name_of(1), Some("on"));
        assert_eq!(lookup.name_of(7), None);
    }

    #[test]
    fn test_require_value_lists_names() {
        let err = power_on().require_value("power_on_behavior", "sometimes").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("off, on, toggle, previous"), "{message}");
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        let lookup: Lookup =
            serde_json::from_str(r#"{"zebra": 2, "apple": 0, "mango": 1}"#).unwrap();
        assert_eq!(lookup.names(), vec!["zebra", "apple", "mango"]);
        assert_eq!(lookup.value_of("apple"), Some(0));
    }
}
