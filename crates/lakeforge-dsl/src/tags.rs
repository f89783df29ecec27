// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordered key/value metadata attached to every resource.

use crate::schema::{FieldType, Properties, SchemaError, value_type_name};
use serde::Serialize;
use serde_json::Value;

/// A single tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Ordered tag list.
///
/// Keys are normalized on insertion, values are kept verbatim. Nothing is
/// deduplicated: when a key repeats, the last occurrence wins for readers that
/// need a single value (see [`Tags::get`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags {
    items: Vec<Tag>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.items.push(Tag {
            key: normalize_key(key),
            value: value.into(),
        });
    }

    /// Builder-style [`Tags::add`].
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Append every entry of a document `tags` map, in document order.
    ///
    /// Numbers and booleans are stringified; anything else is a type error.
    pub fn extend_from_document(&mut self, map: &Properties) -> Result<(), SchemaError> {
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(SchemaError::TypeMismatch {
                        field: format!("tags.{}", key),
                        actual: value_type_name(other),
                        expected: FieldType::String,
                    });
                }
            };
            self.add(key, value);
        }
        Ok(())
    }

    /// Tags in insertion order.
    pub fn items(&self) -> &[Tag] {
        &self.items
    }

    /// Value of the last tag with the given (normalized) key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.items
            .iter()
            .rev()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::new();
        for (k, v) in iter {
            tags.add(k.as_ref(), v);
        }
        tags
    }
}

fn normalize_key(key: &str) -> String {
    key.replace(['_', ' '], "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_normalizes_key_only() {
        let mut tags = Tags::new();
        tags.add("Cost_Center", "Data Team");
        assert_eq!(tags.items()[0].key, "cost-center");
        assert_eq!(tags.items()[0].value, "Data Team");
    }

    #[test]
    fn test_duplicates_are_kept_in_order() {
        let tags = Tags::new().with("owner", "a").with("Owner", "b");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("owner"), Some("b"));
    }

    #[test]
    fn test_from_iterator() {
        let tags: Tags = [("example 1", "value1"), ("example2", "value2")]
            .into_iter()
            .collect();
        assert_eq!(tags.items()[0].key, "example-1");
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_extend_from_document() {
        let doc = serde_json::json!({"Team": "data", "version": 2, "live": true});
        let mut tags = Tags::new().with("pipeline", "p");
        tags.extend_from_document(doc.as_object().unwrap()).unwrap();
        assert_eq!(tags.len(), 4);
        assert_eq!(tags.items()[1].key, "team");
        assert_eq!(tags.get("version"), Some("2"));
        assert_eq!(tags.get("live"), Some("true"));

        let bad = serde_json::json!({"owners": ["a"]});
        let err = Tags::new()
            .extend_from_document(bad.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.field(), "tags.owners");
    }

    #[test]
    fn test_serializes_as_list() {
        let tags = Tags::new().with("k", "v");
        assert_eq!(
            serde_json::to_value(&tags).unwrap(),
            serde_json::json!([{"Key": "k", "Value": "v"}])
        );
    }
}
