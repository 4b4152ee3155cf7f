//! Target graph data model
//!
//! This module implements the output side of an ingestion run:
//! - Twins keyed by id with ordered contents
//! - Directed, named relationships with properties
//! - First-writer-wins accumulation for one sync run
//! - Deterministic relationship naming

pub mod naming;
pub mod relationship;
pub mod store;
pub mod twin;
pub mod types;

// Re-export main types
pub use naming::{DefaultRelationshipNaming, RelationshipNaming};
pub use relationship::Relationship;
pub use store::TwinGraph;
pub use twin::{ContentMap, Twin};
pub use types::{Dtmi, InvalidDtmi};
