//! Twin implementation for the target graph
//!
//! A twin is one typed node of the target graph: an id, the target model it
//! conforms to, and an ordered map of contents (properties and components).

use super::types::Dtmi;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered property map used for twin contents and relationship properties
pub type ContentMap = IndexMap<String, Value>;

/// A typed node of the target graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Twin {
    /// Canonical twin id
    pub id: String,

    /// Target ontology model this twin conforms to
    pub model_id: Dtmi,

    /// Properties and components, in insertion order
    pub contents: ContentMap,
}

impl Twin {
    pub fn new(id: impl Into<String>, model_id: Dtmi) -> Self {
        Twin {
            id: id.into(),
            model_id,
            contents: ContentMap::new(),
        }
    }

    pub fn with_contents(id: impl Into<String>, model_id: Dtmi, contents: ContentMap) -> Self {
        Twin {
            id: id.into(),
            model_id,
            contents,
        }
    }

    /// Set a content value, replacing any previous value
    pub fn set_content(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.contents.insert(key.into(), value.into());
    }

    /// Set a content value only when the key is not yet present.
    ///
    /// Returns `false` when the key already existed; the first value is kept.
    pub fn try_add_content(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        try_add(&mut self.contents, key, value)
    }

    pub fn get_content(&self, key: &str) -> Option<&Value> {
        self.contents.get(key)
    }

    /// Content value as a string slice, if it is a JSON string
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.contents.get(key).and_then(Value::as_str)
    }

    pub fn has_content(&self, key: &str) -> bool {
        self.contents.contains_key(key)
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }
}

/// Insert into a content map unless the key exists; first writer wins.
pub fn try_add(map: &mut ContentMap, key: impl Into<String>, value: impl Into<Value>) -> bool {
    match map.entry(key.into()) {
        indexmap::map::Entry::Occupied(_) => false,
        indexmap::map::Entry::Vacant(slot) => {
            slot.insert(value.into());
            true
        }
    }
}
