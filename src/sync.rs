//! Sync engine
//!
//! The five entry points of an ingestion deployment. Every sync runs the
//! same pipeline:
//! 1. load and parse the target ontology from the store;
//! 2. walk the source sub-graph the scope selects;
//! 3. reconcile the accumulated graph;
//! 4. upload it and fold the store's per-element errors into the report.
//!
//! A cancelled run stops at the next sub-query and uploads nothing.

use crate::cancel::CancellationToken;
use crate::config::IngestConfig;
use crate::error::{ErrorLog, IngestError, IngestResult};
use crate::graph::{DefaultRelationshipNaming, RelationshipNaming, TwinGraph};
use crate::observer::{EventKind, SyncEvent, SyncObserver, TracingObserver};
use crate::ontology::{MappingTables, OntologyMapper, OntologyModel};
use crate::reconcile::{ReconcileStats, ReconciliationPass};
use crate::source::SourceGraphProvider;
use crate::target::{TargetGraphStore, UploadRequest};
use crate::walker::{store_error, EntityTypes, GraphWalker, WalkerDeps};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What a sync covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SyncScope {
    /// Sites, buildings, connectors and utility accounts
    Organization,
    /// Connectors of one building
    Connectors { building_id: String },
    /// Floors, rooms and zones of one building
    Spatial { building_id: String },
    /// Things of one building
    Things { building_id: String, connector_id: String },
    /// Things of one building and their points
    Points { building_id: String, connector_id: String },
}

impl SyncScope {
    pub fn name(&self) -> &'static str {
        match self {
            SyncScope::Organization => "organization",
            SyncScope::Connectors { .. } => "connectors",
            SyncScope::Spatial { .. } => "spatial",
            SyncScope::Things { .. } => "things",
            SyncScope::Points { .. } => "points",
        }
    }

    pub fn entity_types(&self) -> EntityTypes {
        match self {
            SyncScope::Organization => EntityTypes::organization(),
            SyncScope::Connectors { .. } => EntityTypes::connectors(),
            SyncScope::Spatial { .. } => EntityTypes::spatial(),
            SyncScope::Things { .. } => EntityTypes::things(),
            SyncScope::Points { .. } => EntityTypes::points(),
        }
    }

    /// Building the upload is scoped to; empty for organization syncs
    pub fn building_id(&self) -> &str {
        match self {
            SyncScope::Organization => "",
            SyncScope::Connectors { building_id }
            | SyncScope::Spatial { building_id }
            | SyncScope::Things { building_id, .. }
            | SyncScope::Points { building_id, .. } => building_id,
        }
    }

    /// Connector the upload is scoped to; empty unless things or points
    pub fn connector_id(&self) -> &str {
        match self {
            SyncScope::Things { connector_id, .. } | SyncScope::Points { connector_id, .. } => connector_id,
            _ => "",
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Organization => write!(f, "organization"),
            other if other.connector_id().is_empty() => write!(f, "{} ({})", other.name(), other.building_id()),
            other => write!(f, "{} ({}, {})", other.name(), other.building_id(), other.connector_id()),
        }
    }
}

/// Result of one sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub scope: SyncScope,
    /// Reconciled graph as uploaded
    pub graph: TwinGraph,
    /// Issues recorded during the walk, reconciliation and upload
    pub errors: ErrorLog,
    pub reconcile: ReconcileStats,
}

impl SyncReport {
    pub fn twin_count(&self) -> usize {
        self.graph.twin_count()
    }

    pub fn relationship_count(&self) -> usize {
        self.graph.relationship_count()
    }
}

/// Ingestion engine bound to one source, one target store and one set of
/// mapping tables
pub struct SyncEngine {
    source: Arc<dyn SourceGraphProvider>,
    store: Arc<dyn TargetGraphStore>,
    tables: Arc<MappingTables>,
    naming: Arc<dyn RelationshipNaming>,
    observer: Arc<dyn SyncObserver>,
    config: IngestConfig,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn SourceGraphProvider>,
        store: Arc<dyn TargetGraphStore>,
        tables: Arc<MappingTables>,
        config: IngestConfig,
    ) -> Self {
        Self {
            source,
            store,
            tables,
            naming: Arc::new(DefaultRelationshipNaming),
            observer: Arc::new(TracingObserver),
            config,
        }
    }

    pub fn with_naming(mut self, naming: Arc<dyn RelationshipNaming>) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub async fn sync_organization(&self, auto_approve: bool, cancel: &CancellationToken) -> IngestResult<SyncReport> {
        self.run(SyncScope::Organization, auto_approve, cancel).await
    }

    pub async fn sync_connectors(
        &self,
        building_id: &str,
        auto_approve: bool,
        cancel: &CancellationToken,
    ) -> IngestResult<SyncReport> {
        let scope = SyncScope::Connectors {
            building_id: building_id.to_string(),
        };
        self.run(scope, auto_approve, cancel).await
    }

    pub async fn sync_spatial(
        &self,
        building_id: &str,
        auto_approve: bool,
        cancel: &CancellationToken,
    ) -> IngestResult<SyncReport> {
        let scope = SyncScope::Spatial {
            building_id: building_id.to_string(),
        };
        self.run(scope, auto_approve, cancel).await
    }

    pub async fn sync_things(
        &self,
        building_id: &str,
        connector_id: &str,
        auto_approve: bool,
        cancel: &CancellationToken,
    ) -> IngestResult<SyncReport> {
        let scope = SyncScope::Things {
            building_id: building_id.to_string(),
            connector_id: connector_id.to_string(),
        };
        self.run(scope, auto_approve, cancel).await
    }

    pub async fn sync_points(
        &self,
        building_id: &str,
        connector_id: &str,
        auto_approve: bool,
        cancel: &CancellationToken,
    ) -> IngestResult<SyncReport> {
        let scope = SyncScope::Points {
            building_id: building_id.to_string(),
            connector_id: connector_id.to_string(),
        };
        self.run(scope, auto_approve, cancel).await
    }

    /// Run one sync end to end
    pub async fn run(&self, scope: SyncScope, auto_approve: bool, cancel: &CancellationToken) -> IngestResult<SyncReport> {
        let started = Instant::now();
        info!("Starting {} sync", scope);

        let mapper = self.load_mapper(cancel).await?;
        let deps = WalkerDeps {
            source: self.source.as_ref(),
            store: self.store.as_ref(),
            config: &self.config,
            mapper: &mapper,
            naming: self.naming.as_ref(),
            observer: self.observer.as_ref(),
            cancel,
        };
        let mut walker = GraphWalker::new(deps, scope.entity_types());

        match &scope {
            SyncScope::Organization => walker.walk_organization().await?,
            SyncScope::Connectors { building_id } => {
                walker.set_site_id(self.site_for(building_id, cancel).await?);
                walker.walk_building_connectors(building_id).await?;
            }
            SyncScope::Spatial { building_id } => {
                walker.set_site_id(self.site_for(building_id, cancel).await?);
                walker.walk_spatial(building_id).await?;
            }
            SyncScope::Things {
                building_id,
                connector_id,
            }
            | SyncScope::Points {
                building_id,
                connector_id,
            } => {
                walker.set_site_id(self.site_for(building_id, cancel).await?);
                walker.walk_building_things(building_id, connector_id).await?;
            }
        }

        let mut output = walker.into_output();
        let reconcile = ReconciliationPass::new(&mapper, &self.config, self.observer.as_ref()).run(&mut output);

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let request = UploadRequest {
            graph: &output.graph,
            building_id: scope.building_id(),
            connector_id: scope.connector_id(),
            auto_approve,
        };
        let upload_errors = self.store.upload(request, cancel).await.map_err(store_error)?;
        output.errors.merge(upload_errors);

        info!(
            "Completed {} sync: {} twins, {} relationships, {} issues in {:?}",
            scope,
            output.graph.twin_count(),
            output.graph.relationship_count(),
            output.errors.len(),
            started.elapsed()
        );

        Ok(SyncReport {
            scope,
            graph: output.graph,
            errors: output.errors,
            reconcile,
        })
    }

    /// Parse the store's ontology and bind it to the mapping tables
    async fn load_mapper(&self, cancel: &CancellationToken) -> IngestResult<OntologyMapper> {
        self.config.validate()?;
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let documents = self.store.get_models(cancel).await.map_err(store_error)?;
        let model = OntologyModel::parse_documents(&documents)?;
        info!("Loaded {} target types from {} documents", model.len(), documents.len());

        let invalid = self.tables.invalid_targets(&model);
        if !invalid.is_empty() {
            for target in &invalid {
                warn!("Remap target {} is not defined in the target ontology", target);
            }
            self.observer.on_event(
                &SyncEvent::new(EventKind::InvalidTargetModels, invalid.join(", ")).with_count(invalid.len() as u64),
            );
        }

        Ok(OntologyMapper::new(Arc::new(model), Arc::clone(&self.tables), &self.config))
    }

    async fn site_for(&self, building_id: &str, cancel: &CancellationToken) -> IngestResult<String> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        self.store
            .get_site_id_for_mapped_building_id(building_id, cancel)
            .await
            .map_err(store_error)
    }
}
