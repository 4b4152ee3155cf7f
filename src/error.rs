//! Error types for ingestion runs
//!
//! Two tiers:
//! - [`IngestError`]: fatal conditions that abort a sync before or during
//!   traversal (ontology parse failure, collaborator transport errors,
//!   cancellation).
//! - [`ErrorLog`]: non-fatal issues recorded per element or rule while the
//!   traversal keeps going. Keys are first-writer-wins, so an issue is
//!   recorded once per key per run.

use crate::config::ConfigError;
use crate::ontology::OntologyError;
use crate::source::SourceError;
use crate::target::StoreError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Fatal ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Ontology error: {0}")]
    Ontology(#[from] OntologyError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Target store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync cancelled")]
    Cancelled,
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Category of a non-fatal issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Element without an id where one was required
    MissingIdentity,
    /// Source or target type could not be resolved
    UnresolvedType,
    /// Relationship not declared on the source interface
    UnmappedRelationship,
    /// Two values competed for one non-collection property
    DuplicateProperty,
    /// A source sub-query returned no data
    UpstreamEmpty,
    /// Relationship endpoint missing from the accumulated twins
    DanglingRelationship,
    /// Any other processing failure, including store-reported errors
    ProcessingError,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueKind::MissingIdentity => "MissingIdentity",
            IssueKind::UnresolvedType => "UnresolvedType",
            IssueKind::UnmappedRelationship => "UnmappedRelationship",
            IssueKind::DuplicateProperty => "DuplicateProperty",
            IssueKind::UpstreamEmpty => "UpstreamEmpty",
            IssueKind::DanglingRelationship => "DanglingRelationship",
            IssueKind::ProcessingError => "ProcessingError",
        };
        write!(f, "{}", name)
    }
}

/// One recorded issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedIssue {
    pub kind: IssueKind,
    pub message: String,
}

/// Per-run map of non-fatal issues keyed by element or rule identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    entries: IndexMap<String, RecordedIssue>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue under `key` unless the key already has one.
    ///
    /// Returns `true` when the issue was recorded.
    pub fn record(&mut self, key: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.contains_key(&key) {
            return false;
        }
        let message = message.into();
        warn!("[{}] {}: {}", kind, key, message);
        self.entries.insert(key, RecordedIssue { kind, message });
        true
    }

    /// Merge another log into this one; existing keys win
    pub fn merge(&mut self, other: ErrorLog) {
        for (key, issue) in other.entries {
            self.entries.entry(key).or_insert(issue);
        }
    }

    pub fn get(&self, key: &str) -> Option<&RecordedIssue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordedIssue)> {
        self.entries.iter()
    }

    /// Number of issues of a given kind
    pub fn count_of(&self, kind: IssueKind) -> usize {
        self.entries.values().filter(|i| i.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
