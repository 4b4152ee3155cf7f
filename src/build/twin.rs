//! Twin construction
//!
//! Turns one source element into a target twin: resolves its type through
//! the [`OntologyMapper`], fills the declared properties and components from
//! the mapping rules, preserves its identity records and applies the
//! point-specific defaults.

use super::bacnet::BacnetAddress;
use super::RunOutput;
use crate::config::IngestConfig;
use crate::error::IssueKind;
use crate::graph::twin::try_add;
use crate::graph::{ContentMap, Dtmi, Twin};
use crate::observer::{EventKind, SyncEvent, SyncObserver};
use crate::ontology::{EntityKind, MappingIssue, OntologyMapper};
use crate::source::identity::normalize_date;
use crate::source::{IdentityRecord, SourceElement};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

/// One twin to build
#[derive(Debug, Clone, Copy)]
pub struct TwinRequest<'r> {
    pub element: &'r SourceElement,
    pub twin_id: &'r str,
    /// Source exact type name of the element
    pub source_type_name: &'r str,
    pub is_point: bool,
    /// Site the twin belongs to, used when the element carries none
    pub site_id: &'r str,
}

/// Builds twins into a [`RunOutput`]
pub struct TwinBuilder<'a> {
    mapper: &'a OntologyMapper,
    config: &'a IngestConfig,
    observer: &'a dyn SyncObserver,
}

impl<'a> TwinBuilder<'a> {
    pub fn new(mapper: &'a OntologyMapper, config: &'a IngestConfig, observer: &'a dyn SyncObserver) -> Self {
        Self {
            mapper,
            config,
            observer,
        }
    }

    /// Build and accumulate a twin.
    ///
    /// Returns the resolved target type id, or `None` when the type could
    /// not be resolved. A type that resolves but is missing from the
    /// ontology still returns its id so relationships can be attempted.
    pub fn build(&self, out: &mut RunOutput, request: TwinRequest<'_>) -> Option<Dtmi> {
        let twin_id = request.twin_id;
        let target = self.resolve_type(out, twin_id, request.source_type_name)?;

        if !self.mapper.model().contains(&target) {
            out.errors.record(
                twin_id,
                IssueKind::UnresolvedType,
                format!("Target model {} not found in the ontology", target),
            );
            self.observer
                .on_event(&SyncEvent::new(EventKind::TargetModelNotFound, target.as_str()));
            return Some(target);
        }

        let mut contents = ContentMap::new();
        for decl in self.mapper.model().effective_contents(&target) {
            match decl.kind {
                EntityKind::Property => {
                    self.apply_property(out, request.element, twin_id, &target, &decl.name, &mut contents)
                }
                EntityKind::Component => apply_component(request.element, &decl.name, &mut contents),
                _ => {}
            }
        }

        try_add(&mut contents, "name", "None");
        try_add(&mut contents, "siteID", request.site_id);

        self.add_identities(request.element, twin_id, &mut contents);

        if request.is_point {
            self.apply_point_defaults(request.element, twin_id, &target, &mut contents);
        }

        if out.graph.insert_twin(Twin::with_contents(twin_id, target.clone(), contents)) {
            self.observer
                .on_event(&SyncEvent::new(EventKind::TwinsBuilt, target.as_str()));
        }
        Some(target)
    }

    /// Source exact type name → target type id, recording failures
    fn resolve_type(&self, out: &mut RunOutput, twin_id: &str, type_name: &str) -> Option<Dtmi> {
        let source_id = match self.mapper.resolve_source_type_id(type_name) {
            Ok(id) => id,
            Err(issue) => {
                record_mapping_issue(out, self.observer, type_name, &issue);
                out.errors.record(
                    twin_id,
                    IssueKind::UnresolvedType,
                    format!("Mapping for input interface {} not found", type_name),
                );
                return None;
            }
        };

        match self.mapper.resolve_target_type_id(&source_id) {
            Ok(target) => Some(target),
            Err(issue) => {
                let key = match &issue {
                    MappingIssue::InvalidTargetId { output, .. } => output.clone(),
                    _ => twin_id.to_string(),
                };
                record_mapping_issue(out, self.observer, &key, &issue);
                None
            }
        }
    }

    fn apply_property(
        &self,
        out: &mut RunOutput,
        element: &SourceElement,
        twin_id: &str,
        target: &Dtmi,
        property: &str,
        contents: &mut ContentMap,
    ) {
        let tables = self.mapper.tables();

        if let Some(rule) = self.mapper.object_transformation_for(target, property) {
            let value = element
                .field(&rule.input_property)
                .and_then(|object| object.field(&rule.input_property_name))
                .filter(|v| !v.is_null());
            if let Some(value) = value {
                if !try_add(contents, rule.output_property.as_str(), value.to_value_string()) {
                    self.duplicate(out, twin_id, &rule.output_property);
                }
            }
        }

        match element.field(property).filter(|v| !v.is_null()) {
            Some(value) => {
                try_add(contents, property, value.to_value());
            }
            None => {
                if let Some(fill) = tables.fill_property(target, property) {
                    let first = fill
                        .input_properties
                        .iter()
                        .filter_map(|name| element.field(name))
                        .find(|v| !v.is_null());
                    if let Some(value) = first {
                        try_add(contents, property, value.to_value());
                    }
                }
            }
        }

        let Some(projection) = tables.projection(target, property) else {
            return;
        };
        for input in &projection.input_properties {
            let Some(value) = element.field(input).filter(|v| !v.is_null()) else {
                continue;
            };
            let text = value.to_value_string();
            let output = projection.output_property.as_str();

            if !projection.is_output_property_collection {
                if !try_add(contents, output, text) {
                    self.duplicate(out, twin_id, output);
                }
                continue;
            }
            match contents.get_mut(output) {
                Some(Value::Object(entries)) => {
                    if entries.contains_key(input) {
                        self.duplicate(out, twin_id, output);
                    } else {
                        entries.insert(input.clone(), Value::String(text));
                    }
                }
                Some(_) => self.duplicate(out, twin_id, output),
                None => {
                    contents.insert(output.to_string(), json!({ input.as_str(): text }));
                }
            }
        }
    }

    fn duplicate(&self, out: &mut RunOutput, twin_id: &str, property: &str) {
        out.errors.record(
            twin_id,
            IssueKind::DuplicateProperty,
            format!("Duplicate mapping found for property {}", property),
        );
        self.observer
            .on_event(&SyncEvent::new(EventKind::DuplicateMappingProperty, property));
    }

    fn add_identities(&self, element: &SourceElement, twin_id: &str, contents: &mut ContentMap) {
        let records = IdentityRecord::all_of(element);

        let mapped: Vec<Value> = records
            .iter()
            .filter(|r| r.exact_type.is_some())
            .map(|r| {
                let date = r
                    .date_created
                    .as_deref()
                    .map(|raw| normalize_date(raw).unwrap_or_else(|| raw.to_string()));
                json!({
                    "exactType": r.exact_type,
                    "scope": r.scope,
                    "scopeId": r.scope_id,
                    "value": r.value,
                    "dateCreated": date,
                })
            })
            .collect();
        if !mapped.is_empty() {
            try_add(contents, "mappedIds", Value::Array(mapped));
        }

        let mut latest: Option<&IdentityRecord> = None;
        for record in records
            .iter()
            .filter(|r| r.exact_type.as_deref() == Some(self.config.bacnet_identity_type.as_str()))
        {
            let newer = match latest {
                None => true,
                Some(current) => record.created_at() > current.created_at(),
            };
            if newer {
                latest = Some(record);
            }
        }
        let Some(value) = latest.and_then(|r| r.value.as_deref()) else {
            return;
        };
        match BacnetAddress::decode(value) {
            Ok(address) => {
                try_add(contents, "communication", address.to_communication());
            }
            Err(e) => error!("Failed to decode BACnet identity of {}: {}", twin_id, e),
        }
    }

    fn apply_point_defaults(&self, element: &SourceElement, twin_id: &str, target: &Dtmi, contents: &mut ContentMap) {
        if self.mapper.is_capability(target) {
            contents.insert("type".to_string(), json!("analog"));
            try_add(contents, "trendInterval", self.config.default_trend_interval);

            if let Some(datatype) = element.str_field("datatype") {
                if datatype.eq_ignore_ascii_case("double") {
                    contents.insert("type".to_string(), json!("analog"));
                } else if datatype.eq_ignore_ascii_case("int") {
                    contents.insert("type".to_string(), json!("multiState"));
                }
            }
        } else {
            debug!("Point {} of type {} is not a capability", twin_id, target);
        }

        try_add(contents, "connectorID", self.config.legacy_connector_id.as_str());

        if let Some(key) = element.str_field("mappingKey") {
            match mapped_connector_id(key) {
                Some(connector) => {
                    try_add(contents, "mappedConnectorId", connector);
                }
                None => warn!("Point {} has malformed mapping key {}", twin_id, key),
            }
        }
    }
}

fn apply_component(element: &SourceElement, name: &str, contents: &mut ContentMap) {
    match element.field(name).filter(|v| !v.is_null()) {
        Some(value) => try_add(contents, name, value.to_value()),
        None => try_add(contents, name, json!({ "$metadata": {} })),
    };
}

/// Connector segment of a mapping key shaped `<a>/<b>/<connector>@<rest>`
pub fn mapped_connector_id(mapping_key: &str) -> Option<&str> {
    mapping_key
        .split('/')
        .nth(2)
        .and_then(|segment| segment.split('@').next())
        .filter(|id| !id.is_empty())
}

/// Record a type-resolution issue and notify the observer
pub(crate) fn record_mapping_issue(out: &mut RunOutput, observer: &dyn SyncObserver, key: &str, issue: &MappingIssue) {
    out.errors.record(key, issue.kind(), issue.to_string());
    observer.on_event(&SyncEvent::new(issue.event_kind(), key));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::CountingObserver;
    use crate::ontology::{FillProperty, MappingTables, ObjectTransformation, OntologyModel, PropertyProjection};
    use std::sync::Arc;

    const MODELS: &str = r#"[
        {"@id": "dtmi:com:willowinc:Capability;1", "@type": "Interface",
         "contents": [
            {"@type": "Property", "name": "name"},
            {"@type": "Property", "name": "type"},
            {"@type": "Property", "name": "unit"}
         ]},
        {"@id": "dtmi:com:willowinc:TemperatureSensor;1", "@type": "Interface",
         "extends": "dtmi:com:willowinc:Capability;1"},
        {"@id": "dtmi:com:willowinc:Room;1", "@type": "Interface",
         "contents": [
            {"@type": "Property", "name": "name"},
            {"@type": "Property", "name": "code"},
            {"@type": "Property", "name": "alias"},
            {"@type": "Property", "name": "tags"},
            {"@type": "Component", "name": "occupancy"},
            {"@type": "Component", "name": "area"}
         ]}
    ]"#;

    fn tables() -> MappingTables {
        let mut tables = MappingTables::default();
        tables.source_types.insert("Room".into(), "dtmi:com:mappedtech:Room;1".into());
        tables
            .source_types
            .insert("Temperature_Sensor".into(), "dtmi:com:mappedtech:TemperatureSensor;1".into());
        tables.source_types.insert("Orphan".into(), "dtmi:com:mappedtech:Orphan;1".into());
        tables
            .interface_remaps
            .insert("dtmi:com:mappedtech:Room;1".into(), "dtmi:com:willowinc:Room;1".into());
        tables.interface_remaps.insert(
            "dtmi:com:mappedtech:TemperatureSensor;1".into(),
            "dtmi:com:willowinc:TemperatureSensor;1".into(),
        );
        tables
            .interface_remaps
            .insert("dtmi:com:mappedtech:Orphan;1".into(), "dtmi:com:willowinc:Missing;1".into());
        tables.fill_properties.push(FillProperty {
            output_dtmi: "dtmi:com:willowinc:Room;1".into(),
            output_property: "code".into(),
            input_properties: vec!["shortCode".into(), "roomNumber".into()],
        });
        tables.property_projections.push(PropertyProjection {
            output_dtmi: "dtmi:com:willowinc:Room;1".into(),
            output_property: "tags".into(),
            input_properties: vec!["category".into(), "usage".into()],
            is_output_property_collection: true,
        });
        tables.property_projections.push(PropertyProjection {
            output_dtmi: "dtmi:com:willowinc:Room;1".into(),
            output_property: "alias".into(),
            input_properties: vec!["displayName".into(), "label".into()],
            is_output_property_collection: false,
        });
        tables.object_transformations.push(ObjectTransformation {
            output_dtmi: "dtmi:com:willowinc:Capability;1".into(),
            output_property: "unit".into(),
            input_property: "unit".into(),
            input_property_name: "name".into(),
        });
        tables
    }

    struct Fixture {
        mapper: OntologyMapper,
        config: IngestConfig,
        observer: CountingObserver,
    }

    impl Fixture {
        fn new() -> Self {
            let config = IngestConfig::default();
            let model = OntologyModel::parse_documents(&[MODELS]).unwrap();
            Fixture {
                mapper: OntologyMapper::new(Arc::new(model), Arc::new(tables()), &config),
                config,
                observer: CountingObserver::new(),
            }
        }

        fn build(&self, out: &mut RunOutput, element: &SourceElement, type_name: &str, is_point: bool) -> Option<Dtmi> {
            let builder = TwinBuilder::new(&self.mapper, &self.config, &self.observer);
            builder.build(
                out,
                TwinRequest {
                    element,
                    twin_id: "twin-1",
                    source_type_name: type_name,
                    is_point,
                    site_id: "site-1",
                },
            )
        }
    }

    fn element(value: Value) -> SourceElement {
        SourceElement::from(value)
    }

    #[test]
    fn test_fills_properties_and_components() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({
            "id": "SPC1",
            "name": "Lobby",
            "roomNumber": "L-01",
            "area": {"grossArea": 12.5}
        }));

        let model = fixture.build(&mut out, &e, "Room", false).unwrap();
        assert_eq!(model, "dtmi:com:willowinc:Room;1");

        let twin = out.graph.twin("twin-1").unwrap();
        assert_eq!(twin.content_str("name"), Some("Lobby"));
        assert_eq!(twin.content_str("code"), Some("L-01"));
        assert_eq!(twin.get_content("area"), Some(&json!({"grossArea": 12.5})));
        assert_eq!(twin.get_content("occupancy"), Some(&json!({"$metadata": {}})));
        assert_eq!(twin.content_str("siteID"), Some("site-1"));
        assert!(out.errors.is_empty());
        assert_eq!(fixture.observer.count(EventKind::TwinsBuilt), 1);
    }

    #[test]
    fn test_name_defaults_to_none() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        fixture.build(&mut out, &element(json!({"id": "SPC1"})), "Room", false);
        assert_eq!(out.graph.twin("twin-1").unwrap().content_str("name"), Some("None"));
    }

    #[test]
    fn test_projection_into_collection() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({"id": "SPC1", "category": "office", "usage": "meeting"}));
        fixture.build(&mut out, &e, "Room", false);

        let twin = out.graph.twin("twin-1").unwrap();
        assert_eq!(
            twin.get_content("tags"),
            Some(&json!({"category": "office", "usage": "meeting"}))
        );
    }

    #[test]
    fn test_projection_collision_keeps_first_value() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({"id": "SPC1", "displayName": "Main lobby", "label": "Lobby"}));
        fixture.build(&mut out, &e, "Room", false);

        let twin = out.graph.twin("twin-1").unwrap();
        assert_eq!(twin.content_str("alias"), Some("Main lobby"));
        assert_eq!(out.errors.get("twin-1").unwrap().kind, IssueKind::DuplicateProperty);
        assert_eq!(fixture.observer.count(EventKind::DuplicateMappingProperty), 1);
    }

    #[test]
    fn test_inherited_object_transformation() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({"id": "PNT1", "unit": {"name": "degC"}}));
        fixture.build(&mut out, &e, "Temperature_Sensor", true);
        assert_eq!(out.graph.twin("twin-1").unwrap().content_str("unit"), Some("degC"));

        let mut out = RunOutput::default();
        let e = element(json!({"id": "PNT1", "unit": null}));
        fixture.build(&mut out, &e, "Temperature_Sensor", true);
        assert!(!out.graph.twin("twin-1").unwrap().has_content("unit"));
    }

    #[test]
    fn test_capability_point_defaults() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({
            "id": "PNT1",
            "type": "temperature",
            "datatype": "INT",
            "mappingKey": "mapped/conn/CONNABC@2023/points/1"
        }));
        fixture.build(&mut out, &e, "Temperature_Sensor", true);

        let twin = out.graph.twin("twin-1").unwrap();
        assert_eq!(twin.content_str("type"), Some("multiState"));
        assert_eq!(twin.get_content("trendInterval"), Some(&json!(900)));
        assert_eq!(twin.content_str("connectorID"), Some("00000000-35C5-4415-A4B3-7B798D0568E8"));
        assert_eq!(twin.content_str("mappedConnectorId"), Some("CONNABC"));
    }

    #[test]
    fn test_bacnet_identity_decoded() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({
            "id": "PNT1",
            "identities": [
                {"__typename": "BACnetObjectId", "scope": "BUILDING", "value": "1/object=3:1", "dateCreated": "2022-01-01T00:00:00Z"},
                {"__typename": "BACnetObjectId", "scope": "BUILDING", "value": "12345/object=0:7", "dateCreated": "2023-01-01T00:00:00+01:00"},
                {"scope": "ORG", "value": "untyped"}
            ]
        }));
        fixture.build(&mut out, &e, "Temperature_Sensor", true);

        let twin = out.graph.twin("twin-1").unwrap();
        assert_eq!(
            twin.get_content("communication"),
            Some(&json!({"BACnet": {"deviceID": 12345, "objectType": "AnalogInput", "objectID": 7}}))
        );
        let mapped = twin.get_content("mappedIds").and_then(Value::as_array).unwrap();
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[1]["dateCreated"], json!("2022-12-31T23:00:00.000Z"));
    }

    #[test]
    fn test_bad_bacnet_value_is_not_fatal() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        let e = element(json!({
            "id": "PNT1",
            "identities": [{"__typename": "BACnetObjectId", "value": "garbage", "dateCreated": "2023-01-01T00:00:00Z"}]
        }));
        assert!(fixture.build(&mut out, &e, "Temperature_Sensor", true).is_some());
        assert!(!out.graph.twin("twin-1").unwrap().has_content("communication"));
    }

    #[test]
    fn test_unresolved_types() {
        let fixture = Fixture::new();
        let mut out = RunOutput::default();
        assert!(fixture.build(&mut out, &element(json!({"id": "X"})), "Moon", false).is_none());
        assert!(out.errors.contains("Moon"));
        assert!(out.errors.contains("twin-1"));
        assert_eq!(fixture.observer.count(EventKind::InputInterfaceNotFound), 1);

        // Remap points at a model the ontology does not define
        let mut out = RunOutput::default();
        let model = fixture.build(&mut out, &element(json!({"id": "X"})), "Orphan", false);
        assert_eq!(model.unwrap(), "dtmi:com:willowinc:Missing;1");
        assert_eq!(out.graph.twin_count(), 0);
        assert_eq!(out.errors.get("twin-1").unwrap().kind, IssueKind::UnresolvedType);
    }

    #[test]
    fn test_mapped_connector_id() {
        assert_eq!(mapped_connector_id("a/b/CONN@x"), Some("CONN"));
        assert_eq!(mapped_connector_id("a/b/CONN"), Some("CONN"));
        assert_eq!(mapped_connector_id("a/b"), None);
        assert_eq!(mapped_connector_id("a/b/@x"), None);
    }
}
