//! Source graph provider interface
//!
//! The engine never builds query strings itself: it asks for one of the
//! [`SourceQuery`] shapes and the provider turns that into whatever its API
//! needs (paging, auth and retry included).

use super::element::SourceElement;
use crate::cancel::CancellationToken;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Source provider errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response for {query}: {reason}")]
    InvalidResponse { query: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query cancelled")]
    Cancelled,
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Sub-queries the engine issues against the source graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceQuery {
    /// Sites of the organization
    Organization,
    /// Utility accounts with providers and bills
    Accounts,
    /// All connectors
    Connectors,
    BuildingsForSite { site_id: String },
    /// One building's spatial graph
    Building { building_id: String },
    BuildingConnectors { building_id: String },
    /// Things of a building, optionally filtered by connector
    BuildingThings { building_id: String, connector_id: String },
    /// Points for a batch of things (source ids)
    PointsForThings { thing_ids: Vec<String> },
    /// One floor's sub-graph
    Floor { floor_id: String },
}

impl SourceQuery {
    /// Query name, used as the outer key of the response
    pub fn name(&self) -> &'static str {
        match self {
            SourceQuery::Organization => "organization",
            SourceQuery::Accounts => "accounts",
            SourceQuery::Connectors => "connectors",
            SourceQuery::BuildingsForSite { .. } => "buildings_for_site",
            SourceQuery::Building { .. } => "building",
            SourceQuery::BuildingConnectors { .. } => "building_connectors",
            SourceQuery::BuildingThings { .. } => "building_things",
            SourceQuery::PointsForThings { .. } => "points",
            SourceQuery::Floor { .. } => "floor",
        }
    }

    /// Stable key identifying this query and its arguments
    pub fn key(&self) -> String {
        match self {
            SourceQuery::Organization | SourceQuery::Accounts | SourceQuery::Connectors => {
                self.name().to_string()
            }
            SourceQuery::BuildingsForSite { site_id } => format!("{}.{}", self.name(), site_id),
            SourceQuery::Building { building_id } | SourceQuery::BuildingConnectors { building_id } => {
                format!("{}.{}", self.name(), building_id)
            }
            SourceQuery::BuildingThings {
                building_id,
                connector_id,
            } => {
                if connector_id.is_empty() {
                    format!("{}.{}", self.name(), building_id)
                } else {
                    format!("{}.{}.{}", self.name(), building_id, connector_id)
                }
            }
            SourceQuery::PointsForThings { thing_ids } => {
                format!("{}.{}", self.name(), thing_ids.join(","))
            }
            SourceQuery::Floor { floor_id } => format!("{}.{}", self.name(), floor_id),
        }
    }
}

impl fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Provider of source graph responses.
///
/// `Ok(None)` means the source returned no data for the query.
#[async_trait]
pub trait SourceGraphProvider: Send + Sync {
    async fn query(
        &self,
        query: &SourceQuery,
        cancel: &CancellationToken,
    ) -> SourceResult<Option<SourceElement>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_keys() {
        assert_eq!(SourceQuery::Organization.key(), "organization");
        assert_eq!(
            SourceQuery::BuildingsForSite { site_id: "s1".into() }.key(),
            "buildings_for_site.s1"
        );
        assert_eq!(
            SourceQuery::BuildingThings {
                building_id: "b1".into(),
                connector_id: String::new()
            }
            .key(),
            "building_things.b1"
        );
        assert_eq!(
            SourceQuery::BuildingThings {
                building_id: "b1".into(),
                connector_id: "c1".into()
            }
            .key(),
            "building_things.b1.c1"
        );
        assert_eq!(
            SourceQuery::PointsForThings {
                thing_ids: vec!["t1".into(), "t2".into()]
            }
            .to_string(),
            "points.t1,t2"
        );
    }
}
