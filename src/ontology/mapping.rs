//! Mapping tables between the source and target ontologies
//!
//! Loaded once per deployment (JSON or YAML) and read-only during a sync.

use super::ancestry::TypeHierarchy;
use super::model::OntologyModel;
use crate::graph::Dtmi;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mapping table loading errors
#[derive(Error, Debug)]
pub enum MappingTableError {
    #[error("Invalid JSON mapping tables: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML mapping tables: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Output name and direction for a source relationship name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRemap {
    pub output_relationship: String,
    #[serde(default)]
    pub reverse_direction: bool,
}

/// Fill a target property from the first non-null of several source fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillProperty {
    pub output_dtmi: String,
    pub output_property: String,
    pub input_properties: Vec<String>,
}

/// Fan one or more source fields into a target property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyProjection {
    pub output_dtmi: String,
    pub output_property: String,
    pub input_properties: Vec<String>,
    /// Target is a map collecting `{input: value}` entries
    #[serde(default)]
    pub is_output_property_collection: bool,
}

/// Copy `source[input_property][input_property_name]` into a target property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTransformation {
    pub output_dtmi: String,
    pub output_property: String,
    pub input_property: String,
    pub input_property_name: String,
}

/// Source→target ontology mapping tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingTables {
    /// Source exact type name → source ontology type id
    pub source_types: IndexMap<String, String>,
    /// Source ontology type id → its direct parents
    pub source_extends: IndexMap<String, Vec<String>>,
    /// Source ontology type id → target ontology type id
    pub interface_remaps: IndexMap<String, String>,
    /// Source relationship name → output relationship
    pub relationship_remaps: IndexMap<String, RelationshipRemap>,
    pub fill_properties: Vec<FillProperty>,
    pub property_projections: Vec<PropertyProjection>,
    pub object_transformations: Vec<ObjectTransformation>,
}

impl MappingTables {
    pub fn from_json_str(json: &str) -> Result<Self, MappingTableError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, MappingTableError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn source_type(&self, name: &str) -> Option<&str> {
        self.source_types.get(name).map(String::as_str)
    }

    pub fn interface_remap(&self, source_id: &Dtmi) -> Option<&str> {
        self.interface_remaps.get(source_id.as_str()).map(String::as_str)
    }

    pub fn relationship_remap(&self, name: &str) -> Option<&RelationshipRemap> {
        self.relationship_remaps.get(name)
    }

    pub fn fill_property(&self, output_dtmi: &Dtmi, property: &str) -> Option<&FillProperty> {
        self.fill_properties
            .iter()
            .find(|f| output_dtmi == f.output_dtmi.as_str() && f.output_property == property)
    }

    pub fn projection(&self, output_dtmi: &Dtmi, property: &str) -> Option<&PropertyProjection> {
        self.property_projections
            .iter()
            .find(|p| output_dtmi == p.output_dtmi.as_str() && p.output_property == property)
    }

    pub fn object_transformation(&self, output_dtmi: &Dtmi, property: &str) -> Option<&ObjectTransformation> {
        self.object_transformations
            .iter()
            .find(|t| output_dtmi == t.output_dtmi.as_str() && t.output_property == property)
    }

    /// Whether any transformation targets `property`, regardless of type
    pub fn has_transformation_for_property(&self, property: &str) -> bool {
        self.object_transformations
            .iter()
            .any(|t| t.output_property == property)
    }

    /// Interface remap outputs that do not parse or are missing from `model`
    pub fn invalid_targets(&self, model: &OntologyModel) -> Vec<String> {
        let mut invalid: Vec<String> = self
            .interface_remaps
            .values()
            .filter(|target| !model.contains_str(target))
            .cloned()
            .collect();
        invalid.sort();
        invalid.dedup();
        invalid
    }
}

/// The source ontology hierarchy recorded in `source_extends`
impl TypeHierarchy for MappingTables {
    fn parents_of(&self, id: &Dtmi) -> Vec<Dtmi> {
        self.source_extends
            .get(id.as_str())
            .map(|parents| parents.iter().filter_map(|p| Dtmi::parse(p).ok()).collect())
            .unwrap_or_default()
    }
}
