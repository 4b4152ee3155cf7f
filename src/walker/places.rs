//! Place traversal
//!
//! Sites, buildings, floors, rooms and zones arrive as nested objects. Each
//! place becomes a twin, its point arrays become point twins, and every
//! other nested object is walked as a child place related to its parent by
//! the field name it was found under.

use super::GraphWalker;
use crate::error::{IngestResult, IssueKind};
use crate::graph::{ContentMap, Dtmi};
use crate::observer::{EventKind, SyncEvent};
use crate::source::{SourceElement, SourceQuery};
use futures::future::BoxFuture;
use tracing::debug;

/// Field names holding the points of a place
const POINT_FIELDS: [&str; 3] = ["points", "hasPoints", "hasPoint"];

pub(super) const HAS_POINT: &str = "hasPoint";
pub(super) const HAS_PART: &str = "hasPart";
const ZONES: &str = "zones";
const IS_PART_OF: &str = "isPartOf";
const LOCATED_IN_GRID_REGION: &str = "locatedInGridRegion";

impl<'a> GraphWalker<'a> {
    /// Walk one place and everything nested under it.
    ///
    /// `parent` is the enclosing source element and `relationship` the field
    /// name the place was found under.
    pub(super) fn walk_place<'s>(
        &'s mut self,
        element: &'s SourceElement,
        parent: Option<&'s SourceElement>,
        relationship: Option<&'s str>,
    ) -> BoxFuture<'s, IngestResult<()>> {
        Box::pin(async move {
            self.check_cancelled()?;

            let Some(mapping) = self.resolve(element) else {
                debug!("Skipping place without id");
                return Ok(());
            };
            let twin_id = mapping.twin_id().to_string();

            let Some(exact_type) = element.exact_type() else {
                if !twin_id.starts_with(&self.config.identity_twin_prefix) {
                    self.output
                        .errors
                        .record(twin_id.as_str(), IssueKind::UnresolvedType, "ExactType not found");
                    self.observer
                        .on_event(&SyncEvent::new(EventKind::ExactTypeNotFound, twin_id.as_str()));
                }
                return Ok(());
            };

            let target = self.build_twin(element, &twin_id, exact_type, false);

            for (name, value) in element.fields() {
                if let Some(items) = value.as_array() {
                    if POINT_FIELDS.contains(&name) {
                        for item in items.iter().filter(|i| i.is_object()) {
                            let Some(point) = self.resolve(item) else {
                                self.output.errors.record(
                                    twin_id.as_str(),
                                    IssueKind::MissingIdentity,
                                    format!("Point without id under {}", twin_id),
                                );
                                return Ok(());
                            };
                            let Some(point_type) = item.exact_type() else {
                                continue;
                            };
                            self.build_twin(item, point.twin_id(), point_type, true);
                            self.relate(
                                &twin_id,
                                target.as_ref(),
                                HAS_POINT,
                                point.twin_id(),
                                point_type,
                                ContentMap::new(),
                            );
                        }
                    } else {
                        for item in items.iter().filter(|i| i.is_object()) {
                            self.walk_place(item, Some(element), Some(name)).await?;
                        }
                    }
                } else if value.is_object() {
                    self.walk_place(value, Some(element), Some(name)).await?;
                }
            }

            if let (Some(parent), Some(relationship)) = (parent, relationship.filter(|r| !r.is_empty())) {
                let parent_id = self.resolve(parent);
                if let (Some(parent_id), Some(parent_type)) = (parent_id, parent.exact_type()) {
                    let parent_source_type = self.source_type_of(parent_type);
                    let name = self.translate_place_relationship(relationship, target.as_ref());
                    self.relate(
                        parent_id.twin_id(),
                        parent_source_type.as_ref(),
                        name,
                        &twin_id,
                        exact_type,
                        ContentMap::new(),
                    );
                }
            }

            if self.context.entities.levels && exact_type.eq_ignore_ascii_case("floor") {
                self.walk_levels(element, &mapping.mapped_id).await?;
            }
            Ok(())
        })
    }

    fn translate_place_relationship<'r>(&self, relationship: &'r str, target: Option<&Dtmi>) -> &'r str {
        match relationship {
            ZONES => HAS_PART,
            IS_PART_OF if target.map_or(false, |t| *t == self.config.grid_region_model_id.as_str()) => {
                LOCATED_IN_GRID_REGION
            }
            other => other,
        }
    }

    /// Walk a floor's own sub-graph with the floor as parent
    async fn walk_levels(&mut self, floor: &SourceElement, floor_id: &str) -> IngestResult<()> {
        let response = self
            .query(SourceQuery::Floor {
                floor_id: floor_id.to_string(),
            })
            .await?;
        let Some(response) = response else {
            return Ok(());
        };

        for level in response.result_elements(None) {
            for (name, value) in level.fields() {
                if let Some(items) = value.as_array() {
                    for item in items.iter().filter(|i| i.is_object()) {
                        self.walk_place(item, Some(floor), Some(name)).await?;
                    }
                } else if value.is_object() {
                    self.walk_place(value, Some(floor), Some(name)).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::EntityTypes;
    use crate::source::{RecordedSource, SourceElement, SourceQuery};
    use serde_json::json;

    fn building() -> SourceElement {
        SourceElement::from(json!({
            "id": "BLD1",
            "exactType": "Building",
            "name": "HQ",
            "floors": [{
                "id": "FLR1",
                "exactType": "Floor",
                "name": "Level 1",
                "hasRoom": [{"id": "RM1", "exactType": "Room", "name": "101"}],
                "hasPoint": [{"id": "PT1", "exactType": "Temperature_Sensor", "name": "Temp"}]
            }],
            "zones": [{"id": "ZN1", "exactType": "Zone", "name": "East"}],
            "isPartOf": {"id": "GR1", "exactType": "GridRegion", "name": "Grid"}
        }))
    }

    #[tokio::test]
    async fn test_walk_nested_places() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::spatial());
        let building = building();

        walker.walk_place(&building, None, None).await.unwrap();
        let out = walker.into_output();

        for id in ["BLD1", "FLR1", "RM1", "PT1", "ZN1", "GR1"] {
            assert!(out.graph.contains_twin(id), "missing twin {}", id);
        }
        assert!(out.graph.relationship("FLR1-hasPoint-PT1").is_some());
        // hasRoom is remapped and reversed
        assert!(out.graph.relationship("RM1-isPartOf-FLR1").is_some());
        // zones become hasPart, which is remapped and reversed
        assert!(out.graph.relationship("ZN1-isPartOf-BLD1").is_some());
        // isPartOf to a grid region is renamed
        assert!(out.graph.relationship("BLD1-locatedInGridRegion-GR1").is_some());
    }

    #[tokio::test]
    async fn test_point_without_id_aborts_place() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::spatial());
        let room = SourceElement::from(json!({
            "id": "RM1",
            "exactType": "Room",
            "points": [
                {"id": "PT1", "exactType": "Temperature_Sensor"},
                {"exactType": "Temperature_Sensor"},
                {"id": "PT3", "exactType": "Temperature_Sensor"}
            ],
            "zones": [{"id": "ZN1", "exactType": "Zone"}]
        }));

        walker.walk_place(&room, None, None).await.unwrap();
        let out = walker.into_output();

        assert!(out.graph.contains_twin("PT1"));
        assert!(!out.graph.contains_twin("PT3"));
        assert!(!out.graph.contains_twin("ZN1"));
        assert!(out.errors.contains("RM1"));
    }

    #[tokio::test]
    async fn test_missing_exact_type() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::spatial());
        let place = SourceElement::from(json!({"id": "X1", "name": "nothing"}));
        let identity = SourceElement::from(json!({"id": "IDN42"}));

        walker.walk_place(&place, None, None).await.unwrap();
        walker.walk_place(&identity, None, None).await.unwrap();
        let out = walker.into_output();

        assert_eq!(out.errors.get("X1").unwrap().message, "ExactType not found");
        assert!(!out.errors.contains("IDN42"));
        assert!(out.graph.is_empty());
    }

    #[tokio::test]
    async fn test_floor_levels_walked() {
        let floor_response = SourceElement::from(json!({"floor": {"floors": [{
            "id": "FLR1",
            "hasRoom": [{"id": "RM9", "exactType": "Room"}]
        }]}}));
        let source = RecordedSource::new().with_response(
            SourceQuery::Floor {
                floor_id: "FLR1".into(),
            },
            floor_response,
        );
        let harness = Harness::new(source);
        let mut walker = harness.walker(EntityTypes::spatial());
        let floor = SourceElement::from(json!({"id": "FLR1", "exactType": "Floor"}));

        walker.walk_place(&floor, None, None).await.unwrap();
        let out = walker.into_output();

        assert!(out.graph.contains_twin("RM9"));
        assert!(out.graph.relationship("RM9-isPartOf-FLR1").is_some());
    }

    #[tokio::test]
    async fn test_levels_skipped_when_disabled() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::things());
        let floor = SourceElement::from(json!({"id": "FLR1", "exactType": "Floor"}));

        walker.walk_place(&floor, None, None).await.unwrap();
        assert!(harness.source.issued_queries().is_empty());
    }
}
