//! Sync event observer
//!
//! Counters that a deployment forwards to its metrics backend. The mapping
//! code only calls [`SyncObserver::on_event`]; what happens to the event is
//! up to the injected implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Kind of observable sync event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ExactTypeNotFound,
    AccountProcessed,
    SiteProcessed,
    SiteNotFound,
    BuildingProcessed,
    TwinsBuilt,
    RelationshipsBuilt,
    ThingTwinNotFound,
    RelationshipNotInModel,
    DuplicateMappingProperty,
    InputInterfaceNotFound,
    InvalidTargetModels,
    InvalidOutputModel,
    TargetModelNotFound,
    OutputMappingNotFound,
    UpstreamEmpty,
    RedundantRelationshipRemoved,
}

impl EventKind {
    /// Stable metric name
    pub fn metric_name(&self) -> &'static str {
        match self {
            EventKind::ExactTypeNotFound => "ingest.exact_type_not_found",
            EventKind::AccountProcessed => "ingest.account_processed",
            EventKind::SiteProcessed => "ingest.site_processed",
            EventKind::SiteNotFound => "ingest.site_not_found",
            EventKind::BuildingProcessed => "ingest.building_processed",
            EventKind::TwinsBuilt => "ingest.twins",
            EventKind::RelationshipsBuilt => "ingest.relationships",
            EventKind::ThingTwinNotFound => "ingest.thing_twin_not_found",
            EventKind::RelationshipNotInModel => "ingest.relationship_not_in_model",
            EventKind::DuplicateMappingProperty => "ingest.duplicate_mapping_property",
            EventKind::InputInterfaceNotFound => "ingest.input_interface_not_found",
            EventKind::InvalidTargetModels => "ingest.invalid_target_models",
            EventKind::InvalidOutputModel => "ingest.invalid_output_model",
            EventKind::TargetModelNotFound => "ingest.target_model_not_found",
            EventKind::OutputMappingNotFound => "ingest.output_mapping_not_found",
            EventKind::UpstreamEmpty => "ingest.upstream_empty",
            EventKind::RedundantRelationshipRemoved => "ingest.redundant_relationship_removed",
        }
    }
}

/// One observed event: what happened, to which subject, how many times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub kind: EventKind,
    /// Type name, twin id or other identity the event is about
    pub subject: String,
    pub count: u64,
}

impl SyncEvent {
    pub fn new(kind: EventKind, subject: impl Into<String>) -> Self {
        SyncEvent {
            kind,
            subject: subject.into(),
            count: 1,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }
}

/// Receiver of sync events
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {
    fn on_event(&self, _event: &SyncEvent) {}
}

/// Logs every event at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent) {
        debug!("{} {} +{}", event.kind.metric_name(), event.subject, event.count);
    }
}

/// Sums event counts per kind
#[derive(Debug, Default)]
pub struct CountingObserver {
    counts: Mutex<HashMap<EventKind, u64>>,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts
            .lock()
            .map(|counts| counts.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl SyncObserver for CountingObserver {
    fn on_event(&self, event: &SyncEvent) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(event.kind).or_insert(0) += event.count;
        }
    }
}
