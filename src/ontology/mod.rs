//! Target ontology and source→target mapping
//!
//! - [`OntologyModel`]: parsed target interfaces
//! - [`AncestryWalker`]: cycle-safe `extends` traversal
//! - [`MappingTables`]: deployment-provided mapping rules
//! - [`OntologyMapper`]: type and relationship resolution

pub mod ancestry;
pub mod mapper;
pub mod mapping;
pub mod model;

pub use ancestry::{AncestryWalker, TypeHierarchy};
pub use mapper::{MappingIssue, OntologyMapper};
pub use mapping::{
    FillProperty, MappingTableError, MappingTables, ObjectTransformation, PropertyProjection,
    RelationshipRemap,
};
pub use model::{ContentDecl, EntityKind, OntologyError, OntologyModel, OntologyResult, TypeDefinition};
