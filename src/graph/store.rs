//! In-memory accumulation of twins and relationships for one sync run
//!
//! Both maps are keyed by id and are insert-only from the builders' point
//! of view: the first writer of an id wins for the lifetime of the run.
//! Only the reconciliation pass removes relationships.

use super::relationship::Relationship;
use super::twin::Twin;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Twins and relationships accumulated during traversal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinGraph {
    twins: IndexMap<String, Twin>,
    relationships: IndexMap<String, Relationship>,
}

impl TwinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a twin unless one with the same id exists.
    ///
    /// Returns `true` if the twin was added.
    pub fn insert_twin(&mut self, twin: Twin) -> bool {
        if self.twins.contains_key(&twin.id) {
            debug!("Twin {} already accumulated, keeping first", twin.id);
            return false;
        }
        self.twins.insert(twin.id.clone(), twin);
        true
    }

    /// Insert a relationship unless one with the same id exists.
    pub fn insert_relationship(&mut self, relationship: Relationship) -> bool {
        if self.relationships.contains_key(&relationship.id) {
            debug!("Relationship {} already accumulated, keeping first", relationship.id);
            return false;
        }
        self.relationships.insert(relationship.id.clone(), relationship);
        true
    }

    pub fn twin(&self, id: &str) -> Option<&Twin> {
        self.twins.get(id)
    }

    pub fn contains_twin(&self, id: &str) -> bool {
        self.twins.contains_key(id)
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationships.get(id)
    }

    /// Remove a relationship, preserving the order of the remaining ones
    pub fn remove_relationship(&mut self, id: &str) -> Option<Relationship> {
        self.relationships.shift_remove(id)
    }

    /// Remove every relationship in `ids` in one pass over the graph,
    /// returning how many were removed
    pub fn remove_relationships(&mut self, ids: &FxHashSet<String>) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let before = self.relationships.len();
        self.relationships.retain(|id, _| !ids.contains(id));
        before - self.relationships.len()
    }

    pub fn twins(&self) -> impl Iterator<Item = &Twin> {
        self.twins.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn twin_count(&self) -> usize {
        self.twins.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.twins.is_empty() && self.relationships.is_empty()
    }

    /// Split into the twin and relationship maps
    pub fn into_parts(self) -> (IndexMap<String, Twin>, IndexMap<String, Relationship>) {
        (self.twins, self.relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::Dtmi;

    fn room(id: &str) -> Twin {
        Twin::new(id, Dtmi::parse("dtmi:com:willowinc:Room;1").unwrap())
    }

    #[test]
    fn test_first_twin_wins() {
        let mut graph = TwinGraph::new();
        let mut first = room("r1");
        first.set_content("name", "first");
        let mut second = room("r1");
        second.set_content("name", "second");

        assert!(graph.insert_twin(first));
        assert!(!graph.insert_twin(second));
        assert_eq!(graph.twin_count(), 1);
        assert_eq!(graph.twin("r1").unwrap().content_str("name"), Some("first"));
    }

    #[test]
    fn test_relationship_queries() {
        let mut graph = TwinGraph::new();
        graph.insert_twin(room("r1"));
        graph.insert_twin(room("z1"));
        graph.insert_relationship(Relationship::new("a", "r1", "z1", "isPartOf"));
        graph.insert_relationship(Relationship::new("b", "r1", "z1", "isAdjacentTo"));
        assert!(!graph.insert_relationship(Relationship::new("a", "z1", "r1", "isPartOf")));

        let removed = graph.remove_relationship("a").unwrap();
        assert_eq!(removed.source_id, "r1");
        assert_eq!(graph.relationship_count(), 1);
        assert!(graph.relationship("a").is_none());
    }

    #[test]
    fn test_remove_relationships_keeps_order() {
        let mut graph = TwinGraph::new();
        for id in ["a", "b", "c", "d"] {
            graph.insert_relationship(Relationship::new(id, "r1", "z1", "isPartOf"));
        }
        let ids: FxHashSet<String> = ["b", "d", "missing"].iter().map(|s| s.to_string()).collect();

        assert_eq!(graph.remove_relationships(&ids), 2);
        let left: Vec<&str> = graph.relationships().map(|r| r.id.as_str()).collect();
        assert_eq!(left, vec!["a", "c"]);
        assert_eq!(graph.remove_relationships(&FxHashSet::default()), 0);
    }
}
