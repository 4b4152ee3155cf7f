//! Recorded source responses
//!
//! An in-memory [`SourceGraphProvider`] answering from responses captured
//! ahead of time. Used by the CLI fixture runner and the integration tests.
//!
//! Responses are keyed by [`SourceQuery::key`]. Points are recorded per
//! thing (`points.<thing id>` holding one thing element) and assembled into
//! a batch response on demand, so fixtures do not depend on batch size.

use super::element::SourceElement;
use super::provider::{SourceError, SourceGraphProvider, SourceQuery, SourceResult};
use crate::cancel::CancellationToken;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Provider backed by recorded responses
#[derive(Debug, Default)]
pub struct RecordedSource {
    responses: HashMap<String, SourceElement>,
    issued: Mutex<Vec<SourceQuery>>,
}

impl RecordedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the response for a query
    pub fn with_response(mut self, query: SourceQuery, response: SourceElement) -> Self {
        self.responses.insert(query.key(), response);
        self
    }

    /// Record the points response for one thing: a thing element whose
    /// array fields hold its points.
    pub fn with_thing_points(mut self, thing_id: impl AsRef<str>, thing: SourceElement) -> Self {
        self.responses
            .insert(format!("points.{}", thing_id.as_ref()), thing);
        self
    }

    /// Record a response under a raw key
    pub fn insert(&mut self, key: impl Into<String>, response: SourceElement) {
        self.responses.insert(key.into(), response);
    }

    /// Load every `<key>.json` file of a directory
    pub fn from_dir(dir: impl AsRef<Path>) -> SourceResult<Self> {
        let dir = dir.as_ref();
        let mut source = RecordedSource::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)?;
            let response = SourceElement::from_json_str(&text).map_err(|e| SourceError::InvalidResponse {
                query: key.to_string(),
                reason: e.to_string(),
            })?;
            source.insert(key, response);
        }
        info!("Loaded {} recorded responses from {}", source.responses.len(), dir.display());
        Ok(source)
    }

    /// Queries issued so far, in order
    pub fn issued_queries(&self) -> Vec<SourceQuery> {
        self.issued.lock().map(|q| q.clone()).unwrap_or_default()
    }

    fn points_batch(&self, thing_ids: &[String]) -> Option<SourceElement> {
        let things: Vec<serde_json::Value> = thing_ids
            .iter()
            .filter_map(|id| self.responses.get(&format!("points.{}", id)))
            .map(SourceElement::to_value)
            .collect();
        if things.is_empty() {
            return None;
        }
        Some(SourceElement::from(json!({ "things": { "things": things } })))
    }
}

#[async_trait]
impl SourceGraphProvider for RecordedSource {
    async fn query(
        &self,
        query: &SourceQuery,
        cancel: &CancellationToken,
    ) -> SourceResult<Option<SourceElement>> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        if let Ok(mut issued) = self.issued.lock() {
            issued.push(query.clone());
        }
        debug!("Recorded source query {}", query);

        let response = match query {
            SourceQuery::PointsForThings { thing_ids } => self.points_batch(thing_ids),
            other => self.responses.get(&other.key()).cloned(),
        };
        Ok(response)
    }
}
