//! Target graph store interface
//!
//! The store owns durable persistence: it serves the ontology documents,
//! answers lookups for twins created by earlier syncs and accepts the
//! reconciled graph of a run.

pub mod memory;

use crate::cancel::CancellationToken;
use crate::error::ErrorLog;
use crate::graph::{Twin, TwinGraph};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::{InMemoryTargetStore, UploadSummary};

/// Target store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One upload of a reconciled graph
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub graph: &'a TwinGraph,
    /// Building the sync was scoped to (empty for organization syncs)
    pub building_id: &'a str,
    /// Connector the sync was scoped to (empty when not connector scoped)
    pub connector_id: &'a str,
    pub auto_approve: bool,
}

/// Durable target graph
#[async_trait]
pub trait TargetGraphStore: Send + Sync {
    /// Ontology documents to parse at the start of a sync
    async fn get_models(&self, cancel: &CancellationToken) -> StoreResult<Vec<String>>;

    /// Persist a graph; returns per-element errors reported by the store
    async fn upload(&self, request: UploadRequest<'_>, cancel: &CancellationToken) -> StoreResult<ErrorLog>;

    /// Twin previously created for a source id
    async fn get_twin_for_mapped_id(&self, mapped_id: &str, cancel: &CancellationToken) -> StoreResult<Option<Twin>>;

    /// Site id of a building twin
    async fn get_site_id_for_building(&self, twin_id: &str, cancel: &CancellationToken) -> StoreResult<String>;

    /// Site id of the building twin created for a source building id
    async fn get_site_id_for_mapped_building_id(
        &self,
        mapped_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<String>;
}
