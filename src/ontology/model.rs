//! Target ontology model
//!
//! Parses DTDL-style interface documents into an [`OntologyModel`]: a map
//! from type id to [`TypeDefinition`]. Only what the engine consumes is kept:
//! kind, display name, direct `extends` and content declarations.

use super::ancestry::{AncestryWalker, TypeHierarchy};
use crate::graph::{Dtmi, InvalidDtmi};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Ontology parsing errors
#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("Document {index} is not valid JSON: {source}")]
    Json {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid definition in document {index}: {reason}")]
    InvalidDefinition { index: usize, reason: String },

    #[error(transparent)]
    InvalidId(#[from] InvalidDtmi),

    #[error("Type {0} is defined more than once")]
    DuplicateDefinition(Dtmi),

    #[error("Type {child} extends undefined type {parent}")]
    UndefinedParent { child: Dtmi, parent: Dtmi },

    #[error("No type definitions found")]
    Empty,
}

pub type OntologyResult<T> = Result<T, OntologyError>;

/// Kind of an ontology element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Interface,
    Property,
    Component,
    Relationship,
    Telemetry,
    Command,
}

impl EntityKind {
    fn from_type_names(names: &[String]) -> Option<Self> {
        names.iter().find_map(|name| match name.as_str() {
            "Interface" => Some(EntityKind::Interface),
            "Property" => Some(EntityKind::Property),
            "Component" => Some(EntityKind::Component),
            "Relationship" => Some(EntityKind::Relationship),
            "Telemetry" => Some(EntityKind::Telemetry),
            "Command" => Some(EntityKind::Command),
            _ => None,
        })
    }
}

/// A property, component or relationship declared by an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDecl {
    pub name: String,
    pub kind: EntityKind,
    /// Relationship target interface, when restricted
    pub target: Option<Dtmi>,
}

/// One ontology type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: Dtmi,
    pub kind: EntityKind,
    pub display_name: Option<String>,
    /// Directly extended parents
    pub extends: Vec<Dtmi>,
    /// Directly declared contents, in declaration order
    pub contents: Vec<ContentDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(rename = "@type")]
    kind: OneOrMany<String>,
    name: String,
    #[serde(default)]
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInterface {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@type")]
    kind: OneOrMany<String>,
    #[serde(rename = "displayName", default)]
    display_name: Option<Value>,
    #[serde(default)]
    extends: Option<OneOrMany<Value>>,
    #[serde(default)]
    contents: Vec<RawContent>,
}

/// Parsed target ontology
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyModel {
    types: IndexMap<Dtmi, TypeDefinition>,
}

impl OntologyModel {
    /// Parse DTDL documents; each is an interface object or an array of them
    pub fn parse_documents<S: AsRef<str>>(documents: &[S]) -> OntologyResult<Self> {
        let mut model = OntologyModel::default();
        for (index, document) in documents.iter().enumerate() {
            let value: Value = serde_json::from_str(document.as_ref())
                .map_err(|source| OntologyError::Json { index, source })?;
            match value {
                Value::Array(items) => {
                    for item in items {
                        model.add_interface(index, item)?;
                    }
                }
                other => {
                    model.add_interface(index, other)?;
                }
            }
        }

        if model.types.is_empty() {
            return Err(OntologyError::Empty);
        }
        model.check_parents()?;
        info!("Parsed ontology with {} types", model.types.len());
        Ok(model)
    }

    /// Build a model from already-constructed definitions
    pub fn from_definitions(definitions: impl IntoIterator<Item = TypeDefinition>) -> OntologyResult<Self> {
        let mut model = OntologyModel::default();
        for definition in definitions {
            model.insert(definition)?;
        }
        model.check_parents()?;
        Ok(model)
    }

    fn add_interface(&mut self, index: usize, value: Value) -> OntologyResult<Dtmi> {
        let raw: RawInterface = serde_json::from_value(value).map_err(|e| OntologyError::InvalidDefinition {
            index,
            reason: e.to_string(),
        })?;

        let id = Dtmi::parse(&raw.id)?;
        let kind = EntityKind::from_type_names(&raw.kind.into_vec()).ok_or_else(|| {
            OntologyError::InvalidDefinition {
                index,
                reason: format!("{} has no recognized @type", id),
            }
        })?;

        let mut extends = Vec::new();
        for parent in raw.extends.map(OneOrMany::into_vec).unwrap_or_default() {
            match parent {
                Value::String(parent_id) => extends.push(Dtmi::parse(parent_id)?),
                // Inline parent definition
                inline @ Value::Object(_) => extends.push(self.add_interface(index, inline)?),
                other => {
                    return Err(OntologyError::InvalidDefinition {
                        index,
                        reason: format!("{} has invalid extends entry {}", id, other),
                    })
                }
            }
        }

        let mut contents = Vec::with_capacity(raw.contents.len());
        for content in raw.contents {
            let Some(content_kind) = EntityKind::from_type_names(&content.kind.into_vec()) else {
                debug!("Skipping content {} of {} with unrecognized @type", content.name, id);
                continue;
            };
            let target = content.target.map(Dtmi::parse).transpose()?;
            contents.push(ContentDecl {
                name: content.name,
                kind: content_kind,
                target,
            });
        }

        let display_name = raw.display_name.and_then(|name| match name {
            Value::String(s) => Some(s),
            // Localized map: prefer English, else any entry
            Value::Object(map) => map
                .get("en")
                .or_else(|| map.values().next())
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        });

        self.insert(TypeDefinition {
            id: id.clone(),
            kind,
            display_name,
            extends,
            contents,
        })?;
        Ok(id)
    }

    fn insert(&mut self, definition: TypeDefinition) -> OntologyResult<()> {
        if self.types.contains_key(&definition.id) {
            return Err(OntologyError::DuplicateDefinition(definition.id));
        }
        self.types.insert(definition.id.clone(), definition);
        Ok(())
    }

    fn check_parents(&self) -> OntologyResult<()> {
        for definition in self.types.values() {
            for parent in &definition.extends {
                if !self.types.contains_key(parent) {
                    return Err(OntologyError::UndefinedParent {
                        child: definition.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &Dtmi) -> Option<&TypeDefinition> {
        self.types.get(id)
    }

    pub fn contains(&self, id: &Dtmi) -> bool {
        self.types.contains_key(id)
    }

    /// Look up by string id without parsing it first
    pub fn contains_str(&self, id: &str) -> bool {
        Dtmi::parse(id).map(|id| self.contains(&id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    /// Own contents followed by inherited ones, nearest ancestor first.
    /// A name declared closer to `id` shadows the same name further up.
    pub fn effective_contents(&self, id: &Dtmi) -> Vec<&ContentDecl> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut contents = Vec::new();

        let lineage = std::iter::once(id.clone()).chain(AncestryWalker::new(self).ancestors(id));
        for type_id in lineage {
            let Some(definition) = self.types.get(&type_id) else {
                continue;
            };
            for content in &definition.contents {
                if seen.insert(content.name.as_str()) {
                    contents.push(content);
                }
            }
        }
        contents
    }

    /// Whether `interface` declares or inherits a relationship named `name`
    pub fn declares_relationship(&self, interface: &Dtmi, name: &str) -> bool {
        self.effective_contents(interface)
            .iter()
            .any(|c| c.kind == EntityKind::Relationship && c.name == name)
    }
}

impl TypeHierarchy for OntologyModel {
    fn parents_of(&self, id: &Dtmi) -> Vec<Dtmi> {
        self.types
            .get(id)
            .map(|definition| definition.extends.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACE: &str = r#"[
        {
            "@id": "dtmi:com:willowinc:Space;1",
            "@type": "Interface",
            "displayName": {"en": "Space"},
            "contents": [
                {"@type": "Property", "name": "name", "schema": "string"},
                {"@type": "Relationship", "name": "isPartOf"},
                {"@type": ["Property", "Area"], "name": "area", "schema": "double"}
            ]
        },
        {
            "@id": "dtmi:com:willowinc:Room;1",
            "@type": "Interface",
            "displayName": "Room",
            "extends": "dtmi:com:willowinc:Space;1",
            "contents": [
                {"@type": "Property", "name": "area", "schema": "double"},
                {"@type": "Component", "name": "occupancy", "schema": "dtmi:com:willowinc:Occupancy;1"}
            ]
        }
    ]"#;

    fn room() -> Dtmi {
        Dtmi::parse("dtmi:com:willowinc:Room;1").unwrap()
    }

    #[test]
    fn test_parse_documents() {
        let model = OntologyModel::parse_documents(&[SPACE]).unwrap();
        assert_eq!(model.len(), 2);

        let room = model.get(&room()).unwrap();
        assert_eq!(room.kind, EntityKind::Interface);
        assert_eq!(room.display_name.as_deref(), Some("Room"));
        assert_eq!(room.extends.len(), 1);
        assert_eq!(room.contents[1].kind, EntityKind::Component);

        let space = model.get(&Dtmi::parse("dtmi:com:willowinc:Space;1").unwrap()).unwrap();
        assert_eq!(space.display_name.as_deref(), Some("Space"));
    }

    #[test]
    fn test_effective_contents_inherit_and_shadow() {
        let model = OntologyModel::parse_documents(&[SPACE]).unwrap();
        let names: Vec<&str> = model
            .effective_contents(&room())
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["area", "occupancy", "name", "isPartOf"]);
        assert!(model.declares_relationship(&room(), "isPartOf"));
        assert!(!model.declares_relationship(&room(), "frobnicate"));
    }

    #[test]
    fn test_inline_parent_is_registered() {
        let doc = r#"{
            "@id": "dtmi:com:example:Child;1",
            "@type": "Interface",
            "extends": [{"@id": "dtmi:com:example:Parent;1", "@type": "Interface"}]
        }"#;
        let model = OntologyModel::parse_documents(&[doc]).unwrap();
        assert!(model.contains_str("dtmi:com:example:Parent;1"));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            OntologyModel::parse_documents(&["{not json"]),
            Err(OntologyError::Json { index: 0, .. })
        ));
        assert!(matches!(
            OntologyModel::parse_documents(&[r#"{"@id": "bad id", "@type": "Interface"}"#]),
            Err(OntologyError::InvalidId(_))
        ));
        assert!(matches!(
            OntologyModel::parse_documents(&[
                r#"{"@id": "dtmi:com:example:A;1", "@type": "Interface", "extends": "dtmi:com:example:Missing;1"}"#
            ]),
            Err(OntologyError::UndefinedParent { .. })
        ));
        assert!(matches!(
            OntologyModel::parse_documents(&[
                r#"{"@id": "dtmi:com:example:A;1", "@type": "Interface"}"#,
                r#"{"@id": "dtmi:com:example:A;1", "@type": "Interface"}"#
            ]),
            Err(OntologyError::DuplicateDefinition(_))
        ));
        assert!(matches!(
            OntologyModel::parse_documents(&["[]"]),
            Err(OntologyError::Empty)
        ));
    }
}
