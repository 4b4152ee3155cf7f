//! Source→target type and relationship resolution
//!
//! [`OntologyMapper`] combines the parsed target ontology with the mapping
//! tables. Resolution failures come back as [`MappingIssue`]s; the caller
//! decides which key to record them under.

use super::ancestry::AncestryWalker;
use super::mapping::{MappingTables, ObjectTransformation};
use super::model::OntologyModel;
use crate::config::IngestConfig;
use crate::error::IssueKind;
use crate::graph::Dtmi;
use crate::observer::EventKind;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// Why a type could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingIssue {
    #[error("Mapping for input interface type {0} not found")]
    SourceTypeNotFound(String),

    #[error("Source type id {id} for input type {name} is invalid")]
    InvalidSourceTypeId { name: String, id: String },

    #[error("Output mapping for input type {0} not found")]
    TargetTypeNotFound(Dtmi),

    #[error("Remapped output type {output} for input type {input} is not a valid type id")]
    InvalidTargetId { input: Dtmi, output: String },
}

impl MappingIssue {
    pub fn kind(&self) -> IssueKind {
        IssueKind::UnresolvedType
    }

    pub fn event_kind(&self) -> EventKind {
        match self {
            MappingIssue::SourceTypeNotFound(_) | MappingIssue::InvalidSourceTypeId { .. } => {
                EventKind::InputInterfaceNotFound
            }
            MappingIssue::TargetTypeNotFound(_) => EventKind::OutputMappingNotFound,
            MappingIssue::InvalidTargetId { .. } => EventKind::InvalidOutputModel,
        }
    }
}

/// Resolves source types and relationships into the target ontology
#[derive(Debug)]
pub struct OntologyMapper {
    model: Arc<OntologyModel>,
    tables: Arc<MappingTables>,
    connector_application_model_id: String,
    capability: Option<Dtmi>,
    remap_cache: RwLock<HashMap<Dtmi, Dtmi>>,
}

impl OntologyMapper {
    pub fn new(model: Arc<OntologyModel>, tables: Arc<MappingTables>, config: &IngestConfig) -> Self {
        Self {
            model,
            tables,
            connector_application_model_id: config.connector_application_model_id.clone(),
            capability: Dtmi::parse(&config.capability_model_id).ok(),
            remap_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &OntologyModel {
        &self.model
    }

    pub fn tables(&self) -> &MappingTables {
        &self.tables
    }

    /// Source exact type name → source ontology type id
    pub fn resolve_source_type_id(&self, name: &str) -> Result<Dtmi, MappingIssue> {
        // Connector twins use a synthetic type that maps to itself
        if name == self.connector_application_model_id {
            return Dtmi::parse(name).map_err(|_| MappingIssue::InvalidSourceTypeId {
                name: name.to_string(),
                id: name.to_string(),
            });
        }

        let id = self
            .tables
            .source_type(name)
            .ok_or_else(|| MappingIssue::SourceTypeNotFound(name.to_string()))?;
        Dtmi::parse(id).map_err(|_| MappingIssue::InvalidSourceTypeId {
            name: name.to_string(),
            id: id.to_string(),
        })
    }

    /// Source ontology type id → target ontology type id.
    ///
    /// A type already defined in the target ontology maps to itself.
    /// Otherwise the remap table is consulted for the type and then for its
    /// source-ontology ancestors, nearest first.
    pub fn resolve_target_type_id(&self, source_id: &Dtmi) -> Result<Dtmi, MappingIssue> {
        if self.model.contains(source_id) {
            return Ok(source_id.clone());
        }
        if let Some(cached) = self.remap_cache.read().ok().and_then(|c| c.get(source_id).cloned()) {
            return Ok(cached);
        }

        let lineage = std::iter::once(source_id.clone())
            .chain(AncestryWalker::new(self.tables.as_ref()).ancestors(source_id));
        for candidate in lineage {
            if candidate != *source_id && self.model.contains(&candidate) {
                debug!("{} resolved through ancestor {}", source_id, candidate);
                return Ok(self.cache(source_id, candidate));
            }
            if let Some(output) = self.tables.interface_remap(&candidate) {
                let target = Dtmi::parse(output).map_err(|_| MappingIssue::InvalidTargetId {
                    input: source_id.clone(),
                    output: output.to_string(),
                })?;
                return Ok(self.cache(source_id, target));
            }
        }
        Err(MappingIssue::TargetTypeNotFound(source_id.clone()))
    }

    fn cache(&self, source_id: &Dtmi, target: Dtmi) -> Dtmi {
        if let Ok(mut cache) = self.remap_cache.write() {
            cache.insert(source_id.clone(), target.clone());
        }
        target
    }

    /// Output relationship name and whether the direction is reversed
    pub fn resolve_relationship(&self, name: &str) -> (String, bool) {
        match self.tables.relationship_remap(name) {
            Some(remap) => (remap.output_relationship.clone(), remap.reverse_direction),
            None => (name.to_string(), false),
        }
    }

    /// `id` inherits from the configured Capability marker. The marker
    /// itself is not a capability point.
    pub fn is_capability(&self, id: &Dtmi) -> bool {
        match &self.capability {
            Some(capability) => AncestryWalker::new(self.model.as_ref())
                .find_ancestor(id, |parent| parent == capability)
                .is_some(),
            None => false,
        }
    }

    /// `id` is, or inherits from, `ancestor`
    pub fn is_a(&self, ancestor: &Dtmi, id: &Dtmi) -> bool {
        AncestryWalker::new(self.model.as_ref()).is_a(ancestor, id)
    }

    /// Object transformation for a target property: an exact rule for the
    /// type, else the rule of the nearest ancestor that has one.
    pub fn object_transformation_for(&self, target: &Dtmi, property: &str) -> Option<&ObjectTransformation> {
        if let Some(rule) = self.tables.object_transformation(target, property) {
            return Some(rule);
        }
        if !self.tables.has_transformation_for_property(property) {
            return None;
        }
        let ancestor = AncestryWalker::new(self.model.as_ref()).find_ancestor(target, |candidate| {
            self.tables.object_transformation(candidate, property).is_some()
        })?;
        self.tables.object_transformation(&ancestor, property)
    }
}
