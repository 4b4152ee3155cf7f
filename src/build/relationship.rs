//! Relationship construction
//!
//! Resolves both endpoints into the target ontology, applies the
//! relationship remap, and only emits edges the source interface actually
//! declares.

use super::twin::record_mapping_issue;
use super::RunOutput;
use crate::error::IssueKind;
use crate::graph::{ContentMap, Dtmi, Relationship, RelationshipNaming};
use crate::observer::{EventKind, SyncEvent, SyncObserver};
use crate::ontology::OntologyMapper;
use tracing::{debug, info};

/// One relationship to build
#[derive(Debug, Clone)]
pub struct RelationshipRequest<'r> {
    pub source_id: &'r str,
    /// Type of the source twin: a source-ontology id or an already
    /// resolved target id
    pub source_type: Option<&'r Dtmi>,
    /// Relationship name as found in the source graph
    pub name: &'r str,
    pub target_id: &'r str,
    /// Source exact type name of the target element
    pub target_type_name: &'r str,
    pub properties: ContentMap,
}

impl<'r> RelationshipRequest<'r> {
    pub fn new(
        source_id: &'r str,
        source_type: Option<&'r Dtmi>,
        name: &'r str,
        target_id: &'r str,
        target_type_name: &'r str,
    ) -> Self {
        Self {
            source_id,
            source_type,
            name,
            target_id,
            target_type_name,
            properties: ContentMap::new(),
        }
    }

    pub fn with_properties(mut self, properties: ContentMap) -> Self {
        self.properties = properties;
        self
    }
}

/// Builds relationships into a [`RunOutput`]
pub struct RelationshipBuilder<'a> {
    mapper: &'a OntologyMapper,
    naming: &'a dyn RelationshipNaming,
    observer: &'a dyn SyncObserver,
}

impl<'a> RelationshipBuilder<'a> {
    pub fn new(mapper: &'a OntologyMapper, naming: &'a dyn RelationshipNaming, observer: &'a dyn SyncObserver) -> Self {
        Self {
            mapper,
            naming,
            observer,
        }
    }

    /// Build and accumulate a relationship. Returns `true` if one was added.
    pub fn build(&self, out: &mut RunOutput, request: RelationshipRequest<'_>) -> bool {
        let target_source_type = match self.mapper.resolve_source_type_id(request.target_type_name) {
            Ok(id) => id,
            Err(issue) => {
                record_mapping_issue(out, self.observer, request.target_type_name, &issue);
                return false;
            }
        };
        if let Err(issue) = self.mapper.resolve_target_type_id(&target_source_type) {
            record_mapping_issue(out, self.observer, request.target_id, &issue);
            return false;
        }

        let source_output = match request.source_type {
            Some(source_type) => match self.mapper.resolve_target_type_id(source_type) {
                Ok(id) => Some(id),
                Err(issue) => {
                    info!("Source type of {} not resolved: {}", request.source_id, issue);
                    None
                }
            },
            None => {
                info!("No source type given for {}", request.source_id);
                None
            }
        };

        if request.name.is_empty() {
            out.errors.record(
                request.source_id,
                IssueKind::UnmappedRelationship,
                "Input relationship type is empty",
            );
            return false;
        }

        let (name, reversed) = self.mapper.resolve_relationship(request.name);

        let declared = source_output
            .as_ref()
            .map_or(false, |interface| self.mapper.model().declares_relationship(interface, &name));
        if !declared {
            let interface = source_output
                .as_ref()
                .map(Dtmi::to_string)
                .unwrap_or_else(|| "unknown".to_string());
            out.errors.record(
                request.source_id,
                IssueKind::UnmappedRelationship,
                format!("Output relationship {} not found in target model {}", name, interface),
            );
            self.observer
                .on_event(&SyncEvent::new(EventKind::RelationshipNotInModel, name.as_str()));
            return false;
        }

        let (source_id, target_id) = if reversed {
            (request.target_id, request.source_id)
        } else {
            (request.source_id, request.target_id)
        };
        let id = self
            .naming
            .relationship_id(source_id, target_id, &name, &request.properties);
        debug!("Relationship {} {} {}", source_id, name, target_id);

        let added = out.graph.insert_relationship(
            Relationship::new(id, source_id, target_id, name.as_str()).with_properties(request.properties),
        );
        if added {
            self.observer
                .on_event(&SyncEvent::new(EventKind::RelationshipsBuilt, name.as_str()));
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::graph::DefaultRelationshipNaming;
    use crate::observer::CountingObserver;
    use crate::ontology::{MappingTables, OntologyModel, RelationshipRemap};
    use serde_json::json;
    use std::sync::Arc;

    const MODELS: &str = r#"[
        {"@id": "dtmi:com:willowinc:Space;1", "@type": "Interface",
         "contents": [{"@type": "Relationship", "name": "isPartOf"}]},
        {"@id": "dtmi:com:willowinc:Room;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1"},
        {"@id": "dtmi:com:willowinc:Level;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1",
         "contents": [{"@type": "Relationship", "name": "hasRoom"}]},
        {"@id": "dtmi:com:willowinc:Equipment;1", "@type": "Interface",
         "contents": [{"@type": "Relationship", "name": "isFedBy"}]}
    ]"#;

    fn mapper() -> OntologyMapper {
        let mut tables = MappingTables::default();
        tables.source_types.insert("Room".into(), "dtmi:com:willowinc:Room;1".into());
        tables.source_types.insert("Floor".into(), "dtmi:com:willowinc:Level;1".into());
        tables.source_types.insert("AHU".into(), "dtmi:com:willowinc:Equipment;1".into());
        tables.relationship_remaps.insert(
            "hasPart".into(),
            RelationshipRemap {
                output_relationship: "isPartOf".into(),
                reverse_direction: true,
            },
        );
        tables.relationship_remaps.insert(
            "containsRoom".into(),
            RelationshipRemap {
                output_relationship: "hasRoom".into(),
                reverse_direction: false,
            },
        );
        let model = OntologyModel::parse_documents(&[MODELS]).unwrap();
        OntologyMapper::new(Arc::new(model), Arc::new(tables), &IngestConfig::default())
    }

    fn room() -> Dtmi {
        Dtmi::parse("dtmi:com:willowinc:Room;1").unwrap()
    }

    fn level() -> Dtmi {
        Dtmi::parse("dtmi:com:willowinc:Level;1").unwrap()
    }

    #[test]
    fn test_valid_relationship() {
        let mapper = mapper();
        let observer = CountingObserver::new();
        let builder = RelationshipBuilder::new(&mapper, &DefaultRelationshipNaming, &observer);
        let mut out = RunOutput::default();

        let room = room();
        assert!(builder.build(&mut out, RelationshipRequest::new("r1", Some(&room), "isPartOf", "l1", "Floor")));
        let rel = out.graph.relationships().next().unwrap();
        assert_eq!((rel.source_id.as_str(), rel.target_id.as_str()), ("r1", "l1"));
        assert_eq!(rel.id, "r1-isPartOf-l1");
        assert_eq!(observer.count(EventKind::RelationshipsBuilt), 1);

        // Same relationship again is deduplicated by id
        assert!(!builder.build(&mut out, RelationshipRequest::new("r1", Some(&room), "isPartOf", "l1", "Floor")));
        assert_eq!(out.graph.relationship_count(), 1);
    }

    #[test]
    fn test_remapped_relationship() {
        let mapper = mapper();
        let builder = RelationshipBuilder::new(&mapper, &DefaultRelationshipNaming, &crate::observer::NoopObserver);
        let mut out = RunOutput::default();

        let level = level();
        assert!(builder.build(&mut out, RelationshipRequest::new("l1", Some(&level), "containsRoom", "r1", "Room")));
        let rel = out.graph.relationships().next().unwrap();
        assert_eq!(rel.name, "hasRoom");
        assert_eq!((rel.source_id.as_str(), rel.target_id.as_str()), ("l1", "r1"));
    }

    #[test]
    fn test_remapped_reversed_relationship() {
        let mapper = mapper();
        let builder = RelationshipBuilder::new(&mapper, &DefaultRelationshipNaming, &crate::observer::NoopObserver);
        let mut out = RunOutput::default();

        let level = level();
        let mut props = ContentMap::new();
        props.insert("order".into(), json!("1"));
        let request = RelationshipRequest::new("l1", Some(&level), "hasPart", "r1", "Room").with_properties(props);
        assert!(builder.build(&mut out, request));

        let rel = out.graph.relationships().next().unwrap();
        assert_eq!(rel.name, "isPartOf");
        assert_eq!((rel.source_id.as_str(), rel.target_id.as_str()), ("r1", "l1"));
        assert_eq!(rel.get_property("order"), Some(&json!("1")));
        assert!(rel.id.starts_with("r1-isPartOf-l1-"));
    }

    #[test]
    fn test_undeclared_relationship_dropped() {
        let mapper = mapper();
        let observer = CountingObserver::new();
        let builder = RelationshipBuilder::new(&mapper, &DefaultRelationshipNaming, &observer);
        let mut out = RunOutput::default();

        let room = room();
        assert!(!builder.build(&mut out, RelationshipRequest::new("r1", Some(&room), "frobnicate", "l1", "Floor")));
        assert_eq!(out.graph.relationship_count(), 0);
        assert_eq!(out.errors.get("r1").unwrap().kind, IssueKind::UnmappedRelationship);
        assert_eq!(observer.count(EventKind::RelationshipNotInModel), 1);
    }

    #[test]
    fn test_unresolvable_target_dropped() {
        let mapper = mapper();
        let builder = RelationshipBuilder::new(&mapper, &DefaultRelationshipNaming, &crate::observer::NoopObserver);
        let mut out = RunOutput::default();

        let room = room();
        assert!(!builder.build(&mut out, RelationshipRequest::new("r1", Some(&room), "isPartOf", "x1", "Moon")));
        assert!(out.errors.contains("Moon"));
        assert_eq!(out.graph.relationship_count(), 0);

        // Missing source type cannot prove the relationship is declared
        assert!(!builder.build(&mut out, RelationshipRequest::new("r2", None, "isPartOf", "l1", "Floor")));
        assert!(out.errors.contains("r2"));

        assert!(!builder.build(&mut out, RelationshipRequest::new("r3", Some(&room), "", "l1", "Floor")));
        assert!(out.errors.contains("r3"));
    }
}
