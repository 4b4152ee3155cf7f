//! Topology ingestion engine
//!
//! Reads a building-topology graph from a source provider (sites, buildings,
//! floors, rooms, zones, equipment, points, connectors, utility accounts),
//! translates every entity and relationship from the source ontology into a
//! target ontology, and hands the reconciled graph to a target store.
//!
//! # Architecture
//!
//! - [`source`]: the untyped source tree, identity resolution and the
//!   provider interface
//! - [`ontology`]: the parsed target ontology, mapping tables and the
//!   [`OntologyMapper`] that resolves types and relationships through them
//! - [`build`]: twin and relationship construction
//! - [`walker`]: recursive traversal of source sub-queries
//! - [`reconcile`]: post-traversal cleanup of redundant containment
//! - [`target`]: the store interface the reconciled graph is uploaded to
//! - [`sync`]: the five sync entry points tying it all together
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use topology_ingest::{
//!     CancellationToken, InMemoryTargetStore, IngestConfig, MappingTables, RecordedSource, SyncEngine,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RecordedSource::from_dir("fixtures")?;
//! let store = InMemoryTargetStore::new(vec![std::fs::read_to_string("models.json")?]);
//! let tables = MappingTables::from_json_str(&std::fs::read_to_string("mappings.json")?)?;
//!
//! let engine = SyncEngine::new(Arc::new(source), Arc::new(store), Arc::new(tables), IngestConfig::default());
//! let report = engine.sync_spatial("BLD1", false, &CancellationToken::new()).await?;
//! println!("{} twins, {} issues", report.twin_count(), report.errors.len());
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod observer;
pub mod ontology;
pub mod reconcile;
pub mod source;
pub mod sync;
pub mod target;
pub mod walker;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use config::{ConfigError, ConfigResult, IngestConfig};
pub use error::{ErrorLog, IngestError, IngestResult, IssueKind, RecordedIssue};

pub use graph::{
    ContentMap, DefaultRelationshipNaming, Dtmi, Relationship, RelationshipNaming, Twin, TwinGraph,
};

pub use observer::{CountingObserver, EventKind, NoopObserver, SyncEvent, SyncObserver, TracingObserver};

pub use ontology::{MappingIssue, MappingTableError, MappingTables, OntologyError, OntologyMapper, OntologyModel};

pub use source::{
    IdentityRecord, IdentityResolver, RecordedSource, SourceElement, SourceError, SourceGraphProvider, SourceQuery,
    TwinMapping,
};

pub use target::{InMemoryTargetStore, StoreError, TargetGraphStore, UploadRequest};

pub use build::{BacnetAddress, RunOutput};
pub use reconcile::{ReconcileStats, ReconciliationPass};
pub use sync::{SyncEngine, SyncReport, SyncScope};
pub use walker::{EntityTypes, GraphWalker};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "1.0.0");
    }
}
