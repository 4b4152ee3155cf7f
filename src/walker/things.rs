//! Thing and point traversal
//!
//! Things (equipment, meters) are walked from a building's thing list. Their
//! points are fetched afterwards in batches, sorted by twin id so batches
//! are stable across runs.

use super::places::HAS_POINT;
use super::GraphWalker;
use crate::error::{IngestResult, IssueKind};
use crate::graph::twin::try_add;
use crate::graph::{ContentMap, Dtmi};
use crate::observer::{EventKind, SyncEvent};
use crate::source::{SourceElement, SourceQuery, TwinMapping};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const HAS_LOCATION: &str = "hasLocation";
const IS_LOCATION_OF: &str = "isLocationOf";
const IS_FED_BY: &str = "isFedBy";
const SERVES: &str = "serves";
const IS_BILLED_TO: &str = "isBilledTo";

impl<'a> GraphWalker<'a> {
    /// Walk one thing. Returns its mapping when a twin type was resolved.
    pub(super) async fn walk_thing(&mut self, element: &SourceElement) -> IngestResult<Option<TwinMapping>> {
        self.check_cancelled()?;

        let Some(mut mapping) = self.resolve(element) else {
            return Ok(None);
        };
        let Some(exact_type) = element.exact_type() else {
            return Ok(None);
        };
        let thing_id = mapping.twin_id().to_string();
        mapping.dtmi = self.build_twin(element, &thing_id, exact_type, false);

        if let Some(location) = element.field(HAS_LOCATION).filter(|l| l.is_object()) {
            self.relate_location(location, &thing_id, exact_type);
        }

        let Some(thing_type) = mapping.dtmi.clone() else {
            return Ok(None);
        };
        self.walk_thing_relationships(element, &thing_id, &thing_type, IS_FED_BY)
            .await?;
        self.walk_thing_relationships(element, &thing_id, &thing_type, SERVES)
            .await?;

        Ok(Some(mapping))
    }

    /// The location of a thing points back at it with `isLocationOf`
    fn relate_location(&mut self, location: &SourceElement, thing_id: &str, thing_type_name: &str) {
        let Some(location_mapping) = self.resolve(location) else {
            return;
        };
        let Some(location_type) = location.exact_type() else {
            return;
        };
        let location_id = location_mapping.twin_id();
        self.build_twin(location, location_id, location_type, false);
        let location_source_type = self.source_type_of(location_type);
        self.relate(
            location_id,
            location_source_type.as_ref(),
            IS_LOCATION_OF,
            thing_id,
            thing_type_name,
            ContentMap::new(),
        );
    }

    async fn walk_thing_relationships(
        &mut self,
        element: &SourceElement,
        thing_id: &str,
        thing_type: &Dtmi,
        relationship: &str,
    ) -> IngestResult<()> {
        let Some(items) = element.array_field(relationship) else {
            return Ok(());
        };

        for item in items.iter().filter(|i| i.is_object()) {
            // Served places are walked as children of the thing
            if relationship == SERVES {
                self.walk_place(item, Some(element), Some(SERVES)).await?;
            }

            let Some(related) = self.resolve(item) else {
                continue;
            };
            let mut properties = ContentMap::new();
            if let Some(props) = item.object_field("properties") {
                for (name, value) in props.fields() {
                    try_add(&mut properties, name, value.to_value_string());
                }
            }
            if let Some(related_type) = item.exact_type() {
                self.relate(
                    thing_id,
                    Some(thing_type),
                    relationship,
                    related.twin_id(),
                    related_type,
                    properties,
                );
            }
        }
        Ok(())
    }

    /// Fetch and build the points of the given things (keyed by twin id)
    pub(super) async fn walk_points(&mut self, things: &BTreeMap<String, TwinMapping>) -> IngestResult<()> {
        if !self.context.entities.points {
            return Ok(());
        }

        let mapped_ids: Vec<String> = things.values().map(|m| m.mapped_id.clone()).collect();
        let batch_size = self.config.thing_query_batch_size.max(1);
        info!("Fetching points for {} things in batches of {}", mapped_ids.len(), batch_size);

        for batch in mapped_ids.chunks(batch_size) {
            let response = self
                .query(SourceQuery::PointsForThings {
                    thing_ids: batch.to_vec(),
                })
                .await?;
            let Some(response) = response else {
                continue;
            };

            for thing in response.result_elements(None) {
                let Some(thing_mapping) = self.resolve(thing) else {
                    continue;
                };
                let thing_id = thing_mapping.twin_id();
                let Some(thing_type) = self.output.graph.twin(thing_id).map(|t| t.model_id.clone()) else {
                    self.output.errors.record(
                        thing_id,
                        IssueKind::ProcessingError,
                        "Thing twin not found in the run",
                    );
                    self.observer
                        .on_event(&SyncEvent::new(EventKind::ThingTwinNotFound, thing_id));
                    continue;
                };

                for (_, value) in thing.fields() {
                    let Some(points) = value.as_array() else {
                        continue;
                    };
                    for point in points.iter().filter(|p| p.is_object()) {
                        if !self.build_point(thing_id, &thing_type, point) {
                            warn!("Billing target without id under a point of {}; stopping points", thing_id);
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Build one point of a thing. Returns `false` when a billing target
    /// without id means the points phase must stop.
    fn build_point(&mut self, thing_id: &str, thing_type: &Dtmi, point: &SourceElement) -> bool {
        let Some(point_mapping) = self.resolve(point) else {
            return true;
        };
        if point.field("unused").and_then(SourceElement::as_bool) == Some(true) {
            debug!("Skipping unused point {}", point_mapping.twin_id());
            return true;
        }
        let Some(point_type_name) = point.exact_type() else {
            return true;
        };

        let point_id = point_mapping.twin_id();
        let point_type = self.build_twin(point, point_id, point_type_name, true);
        self.relate(
            thing_id,
            Some(thing_type),
            HAS_POINT,
            point_id,
            point_type_name,
            ContentMap::new(),
        );

        let Some(billed) = point.field(IS_BILLED_TO).filter(|b| b.is_object()) else {
            return true;
        };
        let Some(billed_mapping) = self.resolve(billed) else {
            return false;
        };
        if let Some(billed_type) = billed.exact_type() {
            self.build_twin(billed, billed_mapping.twin_id(), billed_type, true);
            self.relate(
                point_id,
                point_type.as_ref(),
                IS_BILLED_TO,
                billed_mapping.twin_id(),
                billed_type,
                ContentMap::new(),
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::super::EntityTypes;
    use super::*;
    use crate::source::RecordedSource;
    use serde_json::json;

    fn ahu() -> SourceElement {
        SourceElement::from(json!({
            "id": "AHU1",
            "exactType": "AHU",
            "name": "AHU-1",
            "hasLocation": {"id": "RM1", "exactType": "Room", "name": "Plant"},
            "isFedBy": [{"id": "AHU0", "exactType": "AHU", "properties": {"medium": "air", "order": 2}}],
            "serves": [{"id": "ZN1", "exactType": "Zone", "name": "East"}]
        }))
    }

    #[tokio::test]
    async fn test_walk_thing() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::things());
        let ahu = ahu();

        let mapping = walker.walk_thing(&ahu).await.unwrap().unwrap();
        assert_eq!(mapping.twin_id(), "AHU1");
        assert_eq!(mapping.dtmi.unwrap(), "dtmi:com:willowinc:Equipment;1");

        let out = walker.into_output();
        assert!(out.graph.contains_twin("RM1"));
        assert!(out.graph.contains_twin("ZN1"));
        assert!(out.graph.relationship("RM1-isLocationOf-AHU1").is_some());
        assert!(out.graph.relationship("AHU1-serves-ZN1").is_some());

        let fed_by = out
            .graph
            .relationships()
            .find(|r| r.name == "isFedBy")
            .unwrap();
        assert_eq!(fed_by.target_id, "AHU0");
        assert_eq!(fed_by.get_property("medium"), Some(&json!("air")));
        assert_eq!(fed_by.get_property("order"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn test_thing_without_type_is_skipped() {
        let harness = Harness::new(RecordedSource::new());
        let mut walker = harness.walker(EntityTypes::things());
        let thing = SourceElement::from(json!({"id": "T1"}));

        assert!(walker.walk_thing(&thing).await.unwrap().is_none());
    }

    fn points_harness() -> Harness {
        let source = RecordedSource::new().with_thing_points(
            "AHU1",
            SourceElement::from(json!({
                "id": "AHU1",
                "hasPoint": [
                    {"id": "PT1", "exactType": "Temperature_Sensor", "name": "Supply Temp",
                     "isBilledTo": {"id": "ACC1", "exactType": "Utility_Account"}},
                    {"id": "PT2", "exactType": "Temperature_Sensor", "unused": true},
                    {"exactType": "Temperature_Sensor"},
                    {"id": "PT4", "exactType": "Temperature_Sensor"}
                ]
            })),
        );
        Harness::new(source)
    }

    #[tokio::test]
    async fn test_points_phase() {
        let harness = points_harness();
        let mut walker = harness.walker(EntityTypes::points());
        let ahu = ahu();
        let mapping = walker.walk_thing(&ahu).await.unwrap().unwrap();

        let mut things = BTreeMap::new();
        things.insert(mapping.twin_id().to_string(), mapping);
        walker.walk_points(&things).await.unwrap();
        let out = walker.into_output();

        assert!(out.graph.relationship("AHU1-hasPoint-PT1").is_some());
        assert!(out.graph.relationship("AHU1-hasPoint-PT4").is_some());
        assert!(!out.graph.contains_twin("PT2"));
        assert!(out.graph.contains_twin("ACC1"));
        assert!(out.graph.relationship("PT1-isBilledTo-ACC1").is_some());
        assert_eq!(
            out.graph.twin("PT1").unwrap().get_content("trendInterval"),
            Some(&json!(900))
        );
    }

    #[tokio::test]
    async fn test_points_disabled() {
        let harness = points_harness();
        let mut walker = harness.walker(EntityTypes::things());
        let mut things = BTreeMap::new();
        things.insert("AHU1".to_string(), TwinMapping::new("AHU1"));

        walker.walk_points(&things).await.unwrap();
        assert!(harness.source.issued_queries().is_empty());
    }

    #[tokio::test]
    async fn test_points_for_unknown_thing() {
        let harness = points_harness();
        let mut walker = harness.walker(EntityTypes::points());
        let mut things = BTreeMap::new();
        things.insert("AHU1".to_string(), TwinMapping::new("AHU1"));

        walker.walk_points(&things).await.unwrap();
        let out = walker.into_output();
        assert!(out.errors.contains("AHU1"));
        assert!(!out.graph.contains_twin("PT1"));
    }

    #[tokio::test]
    async fn test_billing_target_without_id_stops_points() {
        let source = RecordedSource::new().with_thing_points(
            "AHU1",
            SourceElement::from(json!({
                "id": "AHU1",
                "hasPoint": [
                    {"id": "PT1", "exactType": "Temperature_Sensor", "isBilledTo": {"exactType": "Utility_Account"}},
                    {"id": "PT2", "exactType": "Temperature_Sensor"}
                ]
            })),
        );
        let harness = Harness::new(source);
        let mut walker = harness.walker(EntityTypes::points());
        let ahu = ahu();
        let mapping = walker.walk_thing(&ahu).await.unwrap().unwrap();
        let mut things = BTreeMap::new();
        things.insert(mapping.twin_id().to_string(), mapping);

        walker.walk_points(&things).await.unwrap();
        let out = walker.into_output();
        assert!(out.graph.contains_twin("PT1"));
        assert!(!out.graph.contains_twin("PT2"));
    }
}
