//! Ordered change snapshot attached to an audit entry
//!
//! Keys keep insertion order, and the canonical form is a compact JSON object
//! in that order, so two identical transitions always produce identical text.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use trustdesk_core::{TrustError, TrustResult};

/// Ordered key → value pairs describing what a transition changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    fields: Vec<(String, Value)>,
    /// Keys whose values could not be converted to JSON
    failures: Vec<String>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Changes::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace `key`. Replacing keeps the original position.
    ///
    /// A value that cannot be represented as JSON is not stored; the failure
    /// is reported by [`Changes::to_canonical_string`].
    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
                    slot.1 = value;
                } else {
                    self.fields.push((key, value));
                }
            }
            Err(e) => self.failures.push(format!("{}: {}", key, e)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// String value of `key`, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.failures.is_empty()
    }

    /// Canonical textual form stored on the audit entry
    pub fn to_canonical_string(&self) -> TrustResult<String> {
        if !self.failures.is_empty() {
            return Err(TrustError::SerializationFailure(self.failures.join("; ")));
        }
        serde_json::to_string(self).map_err(|e| TrustError::SerializationFailure(e.to_string()))
    }

    /// Parse a payload produced by [`Changes::to_canonical_string`]
    pub fn parse(text: &str) -> TrustResult<Self> {
        serde_json::from_str(text).map_err(|e| TrustError::SerializationFailure(e.to_string()))
    }
}

impl Serialize for Changes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Changes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ChangesVisitor;

        impl<'de> Visitor<'de> for ChangesVisitor {
            type Value = Changes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object of changes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Changes, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    fields.push((key, value));
                }
                Ok(Changes {
                    fields,
                    failures: Vec::new(),
                })
            }
        }

        deserializer.deserialize_map(ChangesVisitor)
    }
}
