//! Relationship implementation for the target graph
//!
//! Relationships are directed, named and may carry properties. Their id is
//! assigned by a [`RelationshipNaming`](super::naming::RelationshipNaming)
//! so repeated syncs produce the same ids.

use super::twin::ContentMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A directed relationship between two twins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Deterministic relationship id
    pub id: String,

    /// Twin the relationship goes FROM
    pub source_id: String,

    /// Twin the relationship goes TO
    pub target_id: String,

    /// Relationship name in the target ontology (e.g. "isPartOf")
    pub name: String,

    /// Properties associated with this relationship
    pub properties: ContentMap,
}

impl Relationship {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Relationship {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            name: name.into(),
            properties: ContentMap::new(),
        }
    }

    pub fn with_properties(mut self, properties: ContentMap) -> Self {
        self.properties = properties;
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
