//! In-memory target store
//!
//! Keeps twins and relationships in process. Backs the CLI fixture runner
//! and the integration tests; a deployment replaces it with a client for
//! its twin service.

use super::{StoreError, StoreResult, TargetGraphStore, UploadRequest};
use crate::cancel::CancellationToken;
use crate::error::{ErrorLog, IssueKind};
use crate::graph::{Relationship, Twin};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::info;

/// What one upload contained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub building_id: String,
    pub connector_id: String,
    pub auto_approve: bool,
    pub twins: usize,
    pub relationships: usize,
}

/// Target store held in memory
#[derive(Debug, Default)]
pub struct InMemoryTargetStore {
    models: Vec<String>,
    twins: RwLock<IndexMap<String, Twin>>,
    relationships: RwLock<IndexMap<String, Relationship>>,
    mapped_ids: RwLock<HashMap<String, String>>,
    uploads: Mutex<Vec<UploadSummary>>,
}

impl InMemoryTargetStore {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            models,
            ..Self::default()
        }
    }

    /// Seed a twin created by an earlier sync, reachable by its source id
    pub fn with_twin(self, mapped_id: impl Into<String>, twin: Twin) -> Self {
        if let Ok(mut mapped) = self.mapped_ids.write() {
            mapped.insert(mapped_id.into(), twin.id.clone());
        }
        if let Ok(mut twins) = self.twins.write() {
            twins.insert(twin.id.clone(), twin);
        }
        self
    }

    pub fn twin(&self, id: &str) -> Option<Twin> {
        self.twins.read().ok().and_then(|t| t.get(id).cloned())
    }

    pub fn twin_count(&self) -> usize {
        self.twins.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<UploadSummary> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("store lock poisoned".to_string())
    }

    fn site_of(twin: &Twin) -> String {
        twin.content_str("siteID")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| twin.id.clone())
    }
}

#[async_trait]
impl TargetGraphStore for InMemoryTargetStore {
    async fn get_models(&self, cancel: &CancellationToken) -> StoreResult<Vec<String>> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(self.models.clone())
    }

    async fn upload(&self, request: UploadRequest<'_>, cancel: &CancellationToken) -> StoreResult<ErrorLog> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let mut errors = ErrorLog::new();

        {
            let mut twins = self.twins.write().map_err(|_| Self::poisoned())?;
            let mut mapped = self.mapped_ids.write().map_err(|_| Self::poisoned())?;
            for twin in request.graph.twins() {
                match twins.get_mut(&twin.id) {
                    Some(existing) => {
                        existing.model_id = twin.model_id.clone();
                        for (key, value) in &twin.contents {
                            existing.contents.insert(key.clone(), value.clone());
                        }
                    }
                    None => {
                        twins.insert(twin.id.clone(), twin.clone());
                    }
                }
                mapped.entry(twin.id.clone()).or_insert_with(|| twin.id.clone());
            }
        }

        {
            let twins = self.twins.read().map_err(|_| Self::poisoned())?;
            let mut relationships = self.relationships.write().map_err(|_| Self::poisoned())?;
            for relationship in request.graph.relationships() {
                for endpoint in [&relationship.source_id, &relationship.target_id] {
                    if !twins.contains_key(endpoint) {
                        errors.record(
                            relationship.id.clone(),
                            IssueKind::ProcessingError,
                            format!("Twin {} not found in target store", endpoint),
                        );
                    }
                }
                if errors.contains(&relationship.id) {
                    continue;
                }
                relationships.insert(relationship.id.clone(), relationship.clone());
            }
        }

        let summary = UploadSummary {
            building_id: request.building_id.to_string(),
            connector_id: request.connector_id.to_string(),
            auto_approve: request.auto_approve,
            twins: request.graph.twin_count(),
            relationships: request.graph.relationship_count(),
        };
        info!(
            "Uploaded {} twins and {} relationships (building '{}', connector '{}')",
            summary.twins, summary.relationships, summary.building_id, summary.connector_id
        );
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(summary);
        }
        Ok(errors)
    }

    async fn get_twin_for_mapped_id(&self, mapped_id: &str, cancel: &CancellationToken) -> StoreResult<Option<Twin>> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let twin_id = {
            let mapped = self.mapped_ids.read().map_err(|_| Self::poisoned())?;
            mapped.get(mapped_id).cloned().unwrap_or_else(|| mapped_id.to_string())
        };
        Ok(self.twin(&twin_id))
    }

    async fn get_site_id_for_building(&self, twin_id: &str, cancel: &CancellationToken) -> StoreResult<String> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(self
            .twin(twin_id)
            .map(|twin| Self::site_of(&twin))
            .unwrap_or_else(|| twin_id.to_string()))
    }

    async fn get_site_id_for_mapped_building_id(
        &self,
        mapped_id: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<String> {
        Ok(self
            .get_twin_for_mapped_id(mapped_id, cancel)
            .await?
            .map(|twin| Self::site_of(&twin))
            .unwrap_or_default())
    }
}
