//! Ingestion configuration
//!
//! Every identifier the engine compares against (URN prefixes, marker model
//! ids, relationship names) lives here so deployments against a different
//! target ontology only need a new YAML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for one ingestion deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Prefix of cross-system ids carried in ORG-scoped identities
    pub twin_id_urn_prefix: String,
    /// Twin ids with this prefix are identity artifacts, not physical twins
    pub identity_twin_prefix: String,
    /// Connector type id marking the source connector for identity lookups
    pub source_connector_type_id: String,
    /// Identity exact type holding BACnet addressing
    pub bacnet_identity_type: String,
    /// Connector id stamped on every point when none is present
    pub legacy_connector_id: String,
    /// Synthetic model id used for connector twins
    pub connector_application_model_id: String,
    pub capability_model_id: String,
    pub building_model_id: String,
    pub level_model_id: String,
    pub zone_model_id: String,
    pub grid_region_model_id: String,
    /// Relationship names checked by the reconciliation pass
    pub located_in_relationship: String,
    pub part_of_relationship: String,
    /// Number of things per points sub-query
    pub thing_query_batch_size: usize,
    /// Default trend interval, in seconds, for capability points
    pub default_trend_interval: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            twin_id_urn_prefix: "urn:willowinc:twin:id:".to_string(),
            identity_twin_prefix: "IDN".to_string(),
            source_connector_type_id: "willow-source".to_string(),
            bacnet_identity_type: "BACnetObjectId".to_string(),
            legacy_connector_id: "00000000-35C5-4415-A4B3-7B798D0568E8".to_string(),
            connector_application_model_id: "dtmi:com:willowinc:ConnectorApplication;1".to_string(),
            capability_model_id: "dtmi:com:willowinc:Capability;1".to_string(),
            building_model_id: "dtmi:com:willowinc:Building;1".to_string(),
            level_model_id: "dtmi:com:willowinc:Level;1".to_string(),
            zone_model_id: "dtmi:com:willowinc:Zone;1".to_string(),
            grid_region_model_id: "dtmi:com:willowinc:GridRegion;1".to_string(),
            located_in_relationship: "isLocatedIn".to_string(),
            part_of_relationship: "isPartOf".to_string(),
            thing_query_batch_size: 25,
            default_trend_interval: 900,
        }
    }
}

impl IngestConfig {
    /// Parse a YAML document; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: IngestConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        info!("Loaded ingestion config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.thing_query_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "thing_query_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.located_in_relationship.is_empty() || self.part_of_relationship.is_empty() {
            return Err(ConfigError::Invalid {
                field: "relationship names",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
