//! Source graph traversal
//!
//! A [`GraphWalker`] drives the source sub-queries of one sync, descends
//! through the nested responses and hands every element it recognises to
//! the twin and relationship builders. Everything it produces lands in the
//! run's [`RunOutput`].
//!
//! Traversal is split by what is being walked:
//! - `places`: sites, buildings, levels, rooms, zones and their points
//! - `things`: equipment, their served places and the points phase
//! - `organization`: sites, accounts, connectors and per-building entry points

mod organization;
mod places;
mod things;

use crate::build::twin::record_mapping_issue;
use crate::build::{RelationshipBuilder, RelationshipRequest, RunOutput, TwinBuilder, TwinRequest};
use crate::cancel::CancellationToken;
use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult, IssueKind};
use crate::graph::{ContentMap, Dtmi, RelationshipNaming, Twin};
use crate::observer::{EventKind, SyncEvent, SyncObserver};
use crate::ontology::OntologyMapper;
use crate::source::{IdentityResolver, SourceElement, SourceError, SourceGraphProvider, SourceQuery, TwinMapping};
use crate::target::{StoreError, TargetGraphStore};
use tracing::{debug, info, warn};

/// Entity families a sync is allowed to produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityTypes {
    pub accounts: bool,
    pub organization: bool,
    pub sites: bool,
    pub buildings: bool,
    pub connectors: bool,
    pub levels: bool,
    pub things: bool,
    pub points: bool,
}

impl EntityTypes {
    pub fn organization() -> Self {
        EntityTypes {
            accounts: true,
            organization: true,
            sites: true,
            buildings: true,
            connectors: true,
            ..Default::default()
        }
    }

    pub fn connectors() -> Self {
        EntityTypes {
            buildings: true,
            connectors: true,
            ..Default::default()
        }
    }

    pub fn spatial() -> Self {
        EntityTypes {
            buildings: true,
            levels: true,
            ..Default::default()
        }
    }

    pub fn things() -> Self {
        EntityTypes {
            buildings: true,
            things: true,
            ..Default::default()
        }
    }

    pub fn points() -> Self {
        EntityTypes {
            buildings: true,
            things: true,
            points: true,
            ..Default::default()
        }
    }
}

/// Per-run traversal state
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    /// Site stamped on twins that carry none
    pub site_id: String,
    /// Id of the connector whose identities are trusted as canonical ids
    pub source_connector_id: String,
    pub entities: EntityTypes,
}

/// Collaborators a walker borrows for one run
pub struct WalkerDeps<'a> {
    pub source: &'a dyn SourceGraphProvider,
    pub store: &'a dyn TargetGraphStore,
    pub config: &'a IngestConfig,
    pub mapper: &'a OntologyMapper,
    pub naming: &'a dyn RelationshipNaming,
    pub observer: &'a dyn SyncObserver,
    pub cancel: &'a CancellationToken,
}

/// Recursive traversal of one sync's source graph
pub struct GraphWalker<'a> {
    source: &'a dyn SourceGraphProvider,
    store: &'a dyn TargetGraphStore,
    config: &'a IngestConfig,
    mapper: &'a OntologyMapper,
    observer: &'a dyn SyncObserver,
    cancel: &'a CancellationToken,
    twins: TwinBuilder<'a>,
    relationships: RelationshipBuilder<'a>,
    context: SyncContext,
    output: RunOutput,
}

impl<'a> GraphWalker<'a> {
    pub fn new(deps: WalkerDeps<'a>, entities: EntityTypes) -> Self {
        GraphWalker {
            source: deps.source,
            store: deps.store,
            config: deps.config,
            mapper: deps.mapper,
            observer: deps.observer,
            cancel: deps.cancel,
            twins: TwinBuilder::new(deps.mapper, deps.config, deps.observer),
            relationships: RelationshipBuilder::new(deps.mapper, deps.naming, deps.observer),
            context: SyncContext {
                entities,
                ..Default::default()
            },
            output: RunOutput::default(),
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn set_site_id(&mut self, site_id: impl Into<String>) {
        self.context.site_id = site_id.into();
    }

    pub fn output(&self) -> &RunOutput {
        &self.output
    }

    pub fn into_output(self) -> RunOutput {
        self.output
    }

    fn check_cancelled(&self) -> IngestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }

    /// Issue one source sub-query. `None` means the source had no data.
    async fn query(&self, query: SourceQuery) -> IngestResult<Option<SourceElement>> {
        self.check_cancelled()?;
        debug!("Querying source: {}", query);
        let response = self
            .source
            .query(&query, self.cancel)
            .await
            .map_err(source_error)?;
        if response.is_none() {
            info!("No data returned for {}", query);
            self.observer
                .on_event(&SyncEvent::new(EventKind::UpstreamEmpty, query.key()));
        }
        Ok(response)
    }

    fn resolve(&self, element: &SourceElement) -> Option<TwinMapping> {
        IdentityResolver::new(&self.config.twin_id_urn_prefix, &self.context.source_connector_id).resolve(element)
    }

    fn build_twin(&mut self, element: &SourceElement, twin_id: &str, type_name: &str, is_point: bool) -> Option<Dtmi> {
        self.twins.build(
            &mut self.output,
            TwinRequest {
                element,
                twin_id,
                source_type_name: type_name,
                is_point,
                site_id: &self.context.site_id,
            },
        )
    }

    fn relate(
        &mut self,
        source_id: &str,
        source_type: Option<&Dtmi>,
        name: &str,
        target_id: &str,
        target_type_name: &str,
        properties: ContentMap,
    ) -> bool {
        let request =
            RelationshipRequest::new(source_id, source_type, name, target_id, target_type_name).with_properties(properties);
        self.relationships.build(&mut self.output, request)
    }

    /// Source ontology type id for an exact type name, recording a miss
    fn source_type_of(&mut self, type_name: &str) -> Option<Dtmi> {
        match self.mapper.resolve_source_type_id(type_name) {
            Ok(id) => Some(id),
            Err(issue) => {
                record_mapping_issue(&mut self.output, self.observer, type_name, &issue);
                None
            }
        }
    }

    /// Find the source connector whose identities carry canonical ids
    async fn resolve_source_connector(&mut self) -> IngestResult<()> {
        let response = self.query(SourceQuery::Connectors).await?;
        let wanted = self.config.source_connector_type_id.as_str();
        let connector_id = response
            .as_ref()
            .and_then(|response| {
                response
                    .result_elements(None)
                    .into_iter()
                    .find(|c| c.str_field("connectorTypeId") == Some(wanted))
                    .and_then(SourceElement::id)
            })
            .unwrap_or_default();
        debug!("Source connector: {:?}", connector_id);
        self.context.source_connector_id = connector_id;
        Ok(())
    }

    /// Fetch the target twin of a source building and add it to the run so
    /// relationships to it survive reconciliation.
    async fn stored_building(&mut self, building_id: &str) -> IngestResult<Option<Twin>> {
        self.check_cancelled()?;
        let building = self
            .store
            .get_twin_for_mapped_id(building_id, self.cancel)
            .await
            .map_err(store_error)?;
        let Some(building) = building else {
            self.output.errors.record(
                building_id,
                IssueKind::ProcessingError,
                "Target building not found for source building id",
            );
            return Ok(None);
        };
        if self.output.graph.insert_twin(building.clone()) {
            info!("Added building {} to the run", building.id);
        } else {
            warn!("Building {} already in the run", building.id);
        }
        Ok(Some(building))
    }
}

pub(crate) fn source_error(error: SourceError) -> IngestError {
    match error {
        SourceError::Cancelled => IngestError::Cancelled,
        other => IngestError::Source(other),
    }
}

pub(crate) fn store_error(error: StoreError) -> IngestError {
    match error {
        StoreError::Cancelled => IngestError::Cancelled,
        other => IngestError::Store(other),
    }
}
