//! Deterministic relationship ids
//!
//! The target store keys relationships by id, so the id must be a pure
//! function of the relationship's endpoints, name and properties.

use super::twin::ContentMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Computes relationship ids
pub trait RelationshipNaming: Send + Sync {
    fn relationship_id(
        &self,
        source_id: &str,
        target_id: &str,
        name: &str,
        properties: &ContentMap,
    ) -> String;
}

/// `<source>-<name>-<target>`, suffixed with a short property digest when the
/// relationship carries properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRelationshipNaming;

impl DefaultRelationshipNaming {
    const DIGEST_LEN: usize = 12;

    fn property_digest(properties: &ContentMap) -> String {
        // Order-independent: the same properties in any order give the same id
        let sorted: BTreeMap<&str, String> = properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect();

        let mut hasher = Sha256::new();
        for (key, value) in sorted {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b";");
        }
        let digest = hasher.finalize();
        digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(Self::DIGEST_LEN)
            .collect()
    }
}

impl RelationshipNaming for DefaultRelationshipNaming {
    fn relationship_id(
        &self,
        source_id: &str,
        target_id: &str,
        name: &str,
        properties: &ContentMap,
    ) -> String {
        if properties.is_empty() {
            format!("{}-{}-{}", source_id, name, target_id)
        } else {
            format!(
                "{}-{}-{}-{}",
                source_id,
                name,
                target_id,
                Self::property_digest(properties)
            )
        }
    }
}
