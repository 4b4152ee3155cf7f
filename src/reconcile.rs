//! Post-traversal reconciliation
//!
//! Runs once over the accumulated graph before upload:
//! 1. relationships whose endpoints were never built are dropped;
//! 2. a twin located in (or part of) several places keeps only its finest
//!    containers: Building and Level edges go when a finer place exists,
//!    Building edges go when a Level exists;
//! 3. a Zone that is part of a Level while rooms are part of the zone loses
//!    its own `isPartOf` edges.

use crate::build::RunOutput;
use crate::config::IngestConfig;
use crate::error::IssueKind;
use crate::graph::Dtmi;
use crate::observer::{EventKind, SyncEvent, SyncObserver};
use crate::ontology::OntologyMapper;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info};

/// Counts of what the pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub dangling: usize,
    pub redundant_containment: usize,
    pub zone_edges: usize,
}

impl ReconcileStats {
    pub fn total(&self) -> usize {
        self.dangling + self.redundant_containment + self.zone_edges
    }
}

/// Container classification of a relationship target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Building,
    Level,
    Finer,
}

pub struct ReconciliationPass<'a> {
    mapper: &'a OntologyMapper,
    config: &'a IngestConfig,
    observer: &'a dyn SyncObserver,
    building: Option<Dtmi>,
    level: Option<Dtmi>,
    zone: Option<Dtmi>,
}

impl<'a> ReconciliationPass<'a> {
    pub fn new(mapper: &'a OntologyMapper, config: &'a IngestConfig, observer: &'a dyn SyncObserver) -> Self {
        Self {
            mapper,
            config,
            observer,
            building: Dtmi::parse(&config.building_model_id).ok(),
            level: Dtmi::parse(&config.level_model_id).ok(),
            zone: Dtmi::parse(&config.zone_model_id).ok(),
        }
    }

    pub fn run(&self, out: &mut RunOutput) -> ReconcileStats {
        let mut stats = ReconcileStats {
            dangling: self.drop_dangling(out),
            ..ReconcileStats::default()
        };

        stats.redundant_containment += self.drop_redundant_containers(out, &self.config.located_in_relationship);
        stats.redundant_containment += self.drop_redundant_containers(out, &self.config.part_of_relationship);
        stats.zone_edges = self.drop_zone_sandwich_edges(out);

        let removed = stats.redundant_containment + stats.zone_edges;
        if removed > 0 {
            self.observer.on_event(
                &SyncEvent::new(EventKind::RedundantRelationshipRemoved, "reconciliation").with_count(removed as u64),
            );
        }
        info!(
            "Reconciliation removed {} dangling, {} redundant containment and {} zone relationships",
            stats.dangling, stats.redundant_containment, stats.zone_edges
        );
        stats
    }

    fn drop_dangling(&self, out: &mut RunOutput) -> usize {
        let dangling: Vec<(String, String)> = out
            .graph
            .relationships()
            .filter_map(|r| {
                let missing = [&r.source_id, &r.target_id]
                    .into_iter()
                    .find(|id| !out.graph.contains_twin(id))?;
                Some((r.id.clone(), missing.clone()))
            })
            .collect();

        let ids: FxHashSet<String> = dangling.iter().map(|(id, _)| id.clone()).collect();
        out.graph.remove_relationships(&ids);
        for (id, missing) in &dangling {
            out.errors.record(
                id.as_str(),
                IssueKind::DanglingRelationship,
                format!("Twin {} was not built in this run", missing),
            );
        }
        dangling.len()
    }

    fn classify(&self, out: &mut RunOutput, model: &Dtmi) -> Container {
        if !self.mapper.model().contains(model) {
            out.errors.record(
                model.as_str(),
                IssueKind::ProcessingError,
                format!("Model {} is not defined", model),
            );
            return Container::Finer;
        }
        let is = |marker: &Option<Dtmi>| marker.as_ref().map_or(false, |m| self.mapper.is_a(m, model));
        if is(&self.building) {
            Container::Building
        } else if is(&self.level) {
            Container::Level
        } else {
            Container::Finer
        }
    }

    fn drop_redundant_containers(&self, out: &mut RunOutput, relationship: &str) -> usize {
        // source twin -> (relationship id, target model), in graph order
        let mut by_source: IndexMap<String, Vec<(String, Dtmi)>> = IndexMap::new();
        for r in out.graph.relationships().filter(|r| r.name == relationship) {
            let Some(target) = out.graph.twin(&r.target_id) else {
                continue;
            };
            by_source
                .entry(r.source_id.clone())
                .or_default()
                .push((r.id.clone(), target.model_id.clone()));
        }

        let mut containers: FxHashMap<Dtmi, Container> = FxHashMap::default();
        let mut to_remove: FxHashSet<String> = FxHashSet::default();

        for (source, edges) in by_source {
            if edges.len() < 2 {
                continue;
            }

            let mut classified: Vec<(String, Container)> = Vec::with_capacity(edges.len());
            for (id, model) in edges {
                let container = match containers.get(&model) {
                    Some(container) => *container,
                    None => {
                        let container = self.classify(out, &model);
                        containers.insert(model, container);
                        container
                    }
                };
                classified.push((id, container));
            }

            let has_finer = classified.iter().any(|(_, c)| *c == Container::Finer);
            let has_level = classified.iter().any(|(_, c)| *c == Container::Level);

            for (id, container) in classified {
                let redundant = match container {
                    Container::Building => has_finer || has_level,
                    Container::Level => has_finer,
                    Container::Finer => false,
                };
                if redundant {
                    debug!("Dropping redundant {} relationship {} of {}", relationship, id, source);
                    to_remove.insert(id);
                }
            }
        }

        out.graph.remove_relationships(&to_remove)
    }

    fn drop_zone_sandwich_edges(&self, out: &mut RunOutput) -> usize {
        let Some(zone) = &self.zone else {
            return 0;
        };
        let part_of = self.config.part_of_relationship.as_str();

        // twins that something else is part of
        let wholes: FxHashSet<&str> = out
            .graph
            .relationships()
            .filter(|r| r.name == part_of)
            .map(|r| r.target_id.as_str())
            .collect();

        let mut zone_models: FxHashMap<&Dtmi, bool> = FxHashMap::default();
        let mut to_remove: FxHashSet<String> = FxHashSet::default();
        for r in out.graph.relationships() {
            if r.name != part_of || !wholes.contains(r.source_id.as_str()) {
                continue;
            }
            let Some(source) = out.graph.twin(&r.source_id) else {
                continue;
            };
            let is_zone = *zone_models
                .entry(&source.model_id)
                .or_insert_with(|| self.mapper.is_a(zone, &source.model_id));
            if is_zone {
                debug!("Dropping {} of zone {} towards {}", part_of, r.source_id, r.target_id);
                to_remove.insert(r.id.clone());
            }
        }

        out.graph.remove_relationships(&to_remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Relationship, Twin};
    use crate::observer::CountingObserver;
    use crate::ontology::{MappingTables, OntologyModel};
    use std::sync::Arc;

    const MODELS: &str = r#"[
        {"@id": "dtmi:com:willowinc:Space;1", "@type": "Interface"},
        {"@id": "dtmi:com:willowinc:Building;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1"},
        {"@id": "dtmi:com:willowinc:Level;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1"},
        {"@id": "dtmi:com:willowinc:Zone;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1"},
        {"@id": "dtmi:com:willowinc:HVACZone;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Zone;1"},
        {"@id": "dtmi:com:willowinc:Room;1", "@type": "Interface", "extends": "dtmi:com:willowinc:Space;1"},
        {"@id": "dtmi:com:willowinc:Equipment;1", "@type": "Interface"},
        {"@id": "dtmi:com:willowinc:Capability;1", "@type": "Interface"}
    ]"#;

    fn mapper(config: &IngestConfig) -> OntologyMapper {
        let model = OntologyModel::parse_documents(&[MODELS]).unwrap();
        OntologyMapper::new(Arc::new(model), Arc::new(MappingTables::default()), config)
    }

    fn twin(out: &mut RunOutput, id: &str, model: &str) {
        let model = Dtmi::parse(format!("dtmi:com:willowinc:{};1", model)).unwrap();
        out.graph.insert_twin(Twin::new(id, model));
    }

    fn rel(out: &mut RunOutput, source: &str, name: &str, target: &str) {
        let id = format!("{}-{}-{}", source, name, target);
        out.graph.insert_relationship(Relationship::new(id, source, target, name));
    }

    fn has(out: &RunOutput, source: &str, name: &str, target: &str) -> bool {
        out.graph.relationship(&format!("{}-{}-{}", source, name, target)).is_some()
    }

    #[test]
    fn test_located_in_keeps_space_edge() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "ahu", "Equipment");
        twin(&mut out, "b1", "Building");
        twin(&mut out, "r1", "Room");
        rel(&mut out, "ahu", "isLocatedIn", "b1");
        rel(&mut out, "ahu", "isLocatedIn", "r1");

        let stats = ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert!(has(&out, "ahu", "isLocatedIn", "r1"));
        assert!(!has(&out, "ahu", "isLocatedIn", "b1"));
        assert_eq!(stats.redundant_containment, 1);
    }

    #[test]
    fn test_part_of_building_and_level_keeps_level() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "z1", "Zone");
        twin(&mut out, "b1", "Building");
        twin(&mut out, "l1", "Level");
        rel(&mut out, "z1", "isPartOf", "b1");
        rel(&mut out, "z1", "isPartOf", "l1");

        ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert!(has(&out, "z1", "isPartOf", "l1"));
        assert!(!has(&out, "z1", "isPartOf", "b1"));
    }

    #[test]
    fn test_single_container_untouched() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "r1", "Room");
        twin(&mut out, "b1", "Building");
        twin(&mut out, "b2", "Building");
        rel(&mut out, "r1", "isPartOf", "b1");
        rel(&mut out, "r1", "isPartOf", "b2");

        let stats = ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert_eq!(stats.total(), 0);
        assert_eq!(out.graph.relationship_count(), 2);
    }

    #[test]
    fn test_zone_sandwich() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let observer = CountingObserver::new();
        let mut out = RunOutput::default();
        twin(&mut out, "z1", "HVACZone");
        twin(&mut out, "l1", "Level");
        twin(&mut out, "r1", "Room");
        rel(&mut out, "z1", "isPartOf", "l1");
        rel(&mut out, "r1", "isPartOf", "z1");

        let stats = ReconciliationPass::new(&mapper, &config, &observer).run(&mut out);
        assert!(!has(&out, "z1", "isPartOf", "l1"));
        assert!(has(&out, "r1", "isPartOf", "z1"));
        assert_eq!(stats.zone_edges, 1);
        assert_eq!(observer.count(EventKind::RedundantRelationshipRemoved), 1);
    }

    #[test]
    fn test_dangling_relationships_dropped() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "r1", "Room");
        rel(&mut out, "r1", "isPartOf", "ghost");

        let stats = ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert_eq!(stats.dangling, 1);
        assert_eq!(out.graph.relationship_count(), 0);
        let issue = out.errors.get("r1-isPartOf-ghost").unwrap();
        assert_eq!(issue.kind, IssueKind::DanglingRelationship);
    }

    #[test]
    fn test_undefined_model_recorded() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "eq", "Equipment");
        twin(&mut out, "x1", "Unknown");
        twin(&mut out, "r1", "Room");
        rel(&mut out, "eq", "isLocatedIn", "x1");
        rel(&mut out, "eq", "isLocatedIn", "r1");

        ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert!(out.errors.contains("dtmi:com:willowinc:Unknown;1"));
        assert_eq!(out.graph.relationship_count(), 2);
    }

    #[test]
    fn test_large_graph_reconciles_in_linear_passes() {
        let config = IngestConfig::default();
        let mapper = mapper(&config);
        let mut out = RunOutput::default();
        twin(&mut out, "b1", "Building");
        twin(&mut out, "l1", "Level");
        for r in 0..200 {
            let room = format!("rm{}", r);
            twin(&mut out, &room, "Room");
            rel(&mut out, &room, "isPartOf", "b1");
            rel(&mut out, &room, "isPartOf", "l1");
        }
        for e in 0..2_000 {
            let equipment = format!("eq{}", e);
            let room = format!("rm{}", e % 200);
            twin(&mut out, &equipment, "Equipment");
            rel(&mut out, &equipment, "isLocatedIn", "b1");
            rel(&mut out, &equipment, "isLocatedIn", &room);
            for p in 0..9 {
                let point = format!("{}-pt{}", equipment, p);
                twin(&mut out, &point, "Capability");
                rel(&mut out, &equipment, "hasPoint", &point);
            }
        }
        rel(&mut out, "eq0", "isLocatedIn", "ghost");
        assert_eq!(out.graph.twin_count(), 20_202);
        assert_eq!(out.graph.relationship_count(), 22_401);

        let started = std::time::Instant::now();
        let stats = ReconciliationPass::new(&mapper, &config, &crate::observer::NoopObserver).run(&mut out);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        assert_eq!(stats.dangling, 1);
        assert_eq!(stats.redundant_containment, 2_200);
        assert_eq!(stats.zone_edges, 0);
        assert_eq!(out.graph.relationship_count(), 20_200);
        assert!(has(&out, "eq1999", "isLocatedIn", "rm199"));
        assert!(!has(&out, "eq1999", "isLocatedIn", "b1"));
        assert!(has(&out, "rm7", "isPartOf", "l1"));
        assert!(!has(&out, "rm7", "isPartOf", "b1"));
        assert!(has(&out, "eq5", "hasPoint", "eq5-pt8"));
        assert!(out.errors.contains("eq0-isLocatedIn-ghost"));
    }
}
