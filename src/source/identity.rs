//! Identity resolution
//!
//! Source elements carry an `identities` array of scoped alternate ids. The
//! resolver picks the canonical twin id from them:
//! 1. ORG-scoped values carrying the twin URN prefix, latest `dateCreated`;
//! 2. otherwise values scoped to the source connector that are not UUIDs,
//!    latest `dateCreated`;
//! 3. otherwise the element's own `id`.
//!
//! On equal `dateCreated` the record seen first in input order wins.

use super::element::SourceElement;
use crate::graph::Dtmi;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ORG_SCOPE: &str = "ORG";

/// One scoped alternate identifier of a source element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Identity type name (the `__typename` of the record)
    pub exact_type: Option<String>,
    pub scope: Option<String>,
    pub scope_id: Option<String>,
    pub value: Option<String>,
    /// Creation date as carried in the source
    pub date_created: Option<String>,
}

impl IdentityRecord {
    pub fn from_element(element: &SourceElement) -> Self {
        let text = |name: &str| element.field(name).and_then(SourceElement::scalar_string);
        IdentityRecord {
            exact_type: text("__typename").filter(|s| !s.is_empty()),
            scope: text("scope"),
            scope_id: text("scopeId"),
            value: text("value"),
            date_created: text("dateCreated"),
        }
    }

    /// All identity records of an element, in input order
    pub fn all_of(element: &SourceElement) -> Vec<IdentityRecord> {
        element
            .array_field("identities")
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.is_object())
                    .map(IdentityRecord::from_element)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.date_created.as_deref().and_then(parse_date)
    }
}

/// Parse an RFC 3339 date; dates without an offset are taken as UTC
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Normalize a date to `YYYY-MM-DDTHH:MM:SS.fffZ` in UTC
pub fn normalize_date(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Resolved identity of one source element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwinMapping {
    /// Source system id, always present
    pub mapped_id: String,
    /// Canonical id from the identity records, when one was found
    pub willow_id: Option<String>,
    /// Target type id, assigned once the twin is built
    pub dtmi: Option<Dtmi>,
}

impl TwinMapping {
    pub fn new(mapped_id: impl Into<String>) -> Self {
        TwinMapping {
            mapped_id: mapped_id.into(),
            willow_id: None,
            dtmi: None,
        }
    }

    /// Canonical id if resolved, else the source id
    pub fn twin_id(&self) -> &str {
        self.willow_id.as_deref().unwrap_or(&self.mapped_id)
    }
}

/// Derives [`TwinMapping`]s from source elements
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver<'a> {
    urn_prefix: &'a str,
    source_connector_id: &'a str,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(urn_prefix: &'a str, source_connector_id: &'a str) -> Self {
        IdentityResolver {
            urn_prefix,
            source_connector_id,
        }
    }

    /// Resolve an element's identity; `None` when it has no id
    pub fn resolve(&self, element: &SourceElement) -> Option<TwinMapping> {
        let mapped_id = element.id()?;
        let records = IdentityRecord::all_of(element);

        let willow_id = self
            .latest_org_id(&records)
            .or_else(|| self.latest_connector_id(&records));

        Some(TwinMapping {
            mapped_id,
            willow_id,
            dtmi: None,
        })
    }

    fn latest_org_id(&self, records: &[IdentityRecord]) -> Option<String> {
        latest(records.iter().filter_map(|r| {
            if r.scope.as_deref() != Some(ORG_SCOPE) {
                return None;
            }
            let candidate = r.value.as_deref()?.strip_prefix(self.urn_prefix)?;
            Some((candidate.to_string(), r.created_at()?))
        }))
    }

    fn latest_connector_id(&self, records: &[IdentityRecord]) -> Option<String> {
        if self.source_connector_id.is_empty() {
            return None;
        }
        latest(records.iter().filter_map(|r| {
            if r.scope_id.as_deref() != Some(self.source_connector_id) {
                return None;
            }
            let value = r.value.as_deref()?;
            // UUID values are legacy ids
            if value.is_empty() || Uuid::parse_str(value).is_ok() {
                return None;
            }
            Some((value.to_string(), r.created_at()?))
        }))
    }
}

/// Candidate with the latest date; first seen wins on ties
fn latest(candidates: impl Iterator<Item = (String, DateTime<Utc>)>) -> Option<String> {
    let mut best: Option<(String, DateTime<Utc>)> = None;
    for (id, date) in candidates {
        let newer = best.as_ref().map_or(true, |(_, best_date)| date > *best_date);
        if newer {
            best = Some((id, date));
        }
    }
    best.map(|(id, _)| id)
}
