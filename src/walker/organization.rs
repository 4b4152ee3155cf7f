//! Organization-level entry points
//!
//! Each sync starts here: sites and their buildings, utility accounts,
//! connectors, and the per-building spatial and thing walks.

use super::places::HAS_PART;
use super::{store_error, GraphWalker};
use crate::error::{IngestResult, IssueKind};
use crate::graph::twin::try_add;
use crate::graph::{ContentMap, Dtmi, Twin};
use crate::observer::{EventKind, SyncEvent};
use crate::source::{SourceElement, SourceQuery, TwinMapping};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const PROCESSING_ERROR_KEY: &str = "Processing Error";
const SERVED_BY: &str = "servedBy";
const HAS_PROVIDER: &str = "hasProvider";
const IS_PROVIDED_BY: &str = "isProvidedBy";
const HAS_BILL: &str = "hasBill";
const HAS_UTILITY_BILL: &str = "hasUtilityBill";

impl<'a> GraphWalker<'a> {
    /// Sites, their buildings, organization connectors and accounts
    pub async fn walk_organization(&mut self) -> IngestResult<()> {
        if self.context.entities.organization {
            match self.query(SourceQuery::Organization).await? {
                Some(response) => {
                    for site in response.result_elements(None) {
                        self.walk_site(site).await?;
                    }
                }
                None => self.no_sites(),
            }
        }

        self.walk_organization_connectors().await?;
        self.walk_accounts().await
    }

    fn no_sites(&mut self) {
        self.output.errors.record(
            PROCESSING_ERROR_KEY,
            IssueKind::UpstreamEmpty,
            "No source sites found for this organization",
        );
        info!("No sites found; check the source organization");
        self.observer
            .on_event(&SyncEvent::new(EventKind::SiteNotFound, "organization"));
    }

    async fn walk_site(&mut self, site: &SourceElement) -> IngestResult<()> {
        if !self.context.entities.sites {
            return Ok(());
        }
        info!("Walking site {}", site.str_field("name").unwrap_or_default());

        self.resolve_source_connector().await?;
        self.walk_place(site, None, None).await?;

        let Some(site_id) = site.id() else {
            self.output.errors.record(
                PROCESSING_ERROR_KEY,
                IssueKind::MissingIdentity,
                "No site id found for this site",
            );
            warn!("Site without id");
            return Ok(());
        };

        if self.context.entities.buildings {
            self.walk_site_buildings(&site_id).await?;
        }

        self.observer
            .on_event(&SyncEvent::new(EventKind::SiteProcessed, site_id));
        Ok(())
    }

    async fn walk_site_buildings(&mut self, site_id: &str) -> IngestResult<()> {
        let response = self
            .query(SourceQuery::BuildingsForSite {
                site_id: site_id.to_string(),
            })
            .await?;
        let Some(response) = response else {
            info!("No buildings found for site {}", site_id);
            return Ok(());
        };

        for site in response.result_elements(None) {
            let Some(buildings) = site.array_field("buildings") else {
                continue;
            };
            for building in buildings.iter().filter(|b| b.is_object()) {
                if let Some(mapping) = self.resolve(building) {
                    self.check_cancelled()?;
                    let site_id = self
                        .store
                        .get_site_id_for_building(mapping.twin_id(), self.cancel)
                        .await
                        .map_err(store_error)?;
                    self.set_site_id(site_id);
                }

                self.walk_place(building, Some(site), Some(HAS_PART)).await?;

                let Some(building_id) = building.id() else {
                    warn!("Building id is missing; skipping its connectors and things");
                    continue;
                };
                if self.context.entities.connectors {
                    self.walk_building_connectors(&building_id).await?;
                }
                if self.context.entities.things {
                    self.walk_building_things(&building_id, "").await?;
                }

                self.observer.on_event(
                    &SyncEvent::new(EventKind::BuildingProcessed, building_id)
                        .with_count(self.output.graph.relationship_count() as u64),
                );
            }
        }
        Ok(())
    }

    /// Connectors of the whole organization
    async fn walk_organization_connectors(&mut self) -> IngestResult<()> {
        let Some(response) = self.query(SourceQuery::Connectors).await? else {
            return Ok(());
        };
        for connector in response.result_elements(None) {
            self.build_connector(connector, None);
        }
        Ok(())
    }

    /// Connectors of one building, each related to the building
    pub async fn walk_building_connectors(&mut self, building_id: &str) -> IngestResult<()> {
        let Some(building) = self.stored_building(building_id).await? else {
            return Ok(());
        };

        let response = self
            .query(SourceQuery::BuildingConnectors {
                building_id: building_id.to_string(),
            })
            .await?;
        let Some(response) = response else {
            return Ok(());
        };

        for element in response.result_elements(None) {
            for (_, value) in element.fields() {
                let Some(connectors) = value.as_array() else {
                    continue;
                };
                for connector in connectors.iter().filter(|c| c.is_object()) {
                    self.build_connector(connector, Some(&building));
                }
            }
        }
        Ok(())
    }

    /// Connectors carry no model or identities of their own: they become
    /// twins of the connector application model.
    fn build_connector(&mut self, element: &SourceElement, building: Option<&Twin>) {
        let Some(mapping) = self.resolve(element) else {
            return;
        };
        let model_id = self.config.connector_application_model_id.clone();
        let model = match Dtmi::parse(&model_id) {
            Ok(model) => model,
            Err(e) => {
                self.output
                    .errors
                    .record(model_id.as_str(), IssueKind::UnresolvedType, e.to_string());
                return;
            }
        };

        let mut contents = ContentMap::new();
        if let Some(name) = element.field("name") {
            let name = name.to_value_string();
            let name = if name.trim().is_empty() { "None".to_string() } else { name };
            try_add(&mut contents, "name", name);
        }
        try_add(&mut contents, "siteID", self.context.site_id.as_str());
        if let Some(connector_type) = element.object_field("connectorType") {
            let field = |name: &str| connector_type.field(name).map_or(Value::Null, SourceElement::to_value);
            try_add(
                &mut contents,
                "connectorType",
                json!({
                    "id": field("id"),
                    "name": field("name"),
                    "version": field("version"),
                    "direction": field("direction"),
                }),
            );
        }

        let connector_id = mapping.twin_id().to_string();
        if self
            .output
            .graph
            .insert_twin(Twin::with_contents(connector_id.as_str(), model, contents))
        {
            self.observer
                .on_event(&SyncEvent::new(EventKind::TwinsBuilt, model_id.as_str()));
        }

        if let Some(building) = building {
            self.relate(
                &building.id,
                Some(&building.model_id),
                SERVED_BY,
                &connector_id,
                &model_id,
                ContentMap::new(),
            );
        }
    }

    /// Utility accounts with their providers and bills
    async fn walk_accounts(&mut self) -> IngestResult<()> {
        if !self.context.entities.accounts {
            return Ok(());
        }
        let Some(response) = self.query(SourceQuery::Accounts).await? else {
            self.output.errors.record(
                SourceQuery::Accounts.key(),
                IssueKind::UpstreamEmpty,
                "No source accounts found for this organization",
            );
            return Ok(());
        };

        for account in response.result_elements(None) {
            let Some(mapping) = self.resolve(account) else {
                warn!("Account without id; stopping accounts");
                return Ok(());
            };
            let Some(exact_type) = account.exact_type() else {
                continue;
            };
            let account_id = mapping.twin_id();
            let account_type = self.build_twin(account, account_id, exact_type, false);

            for (name, value) in account.fields() {
                let relationship = match name {
                    HAS_PROVIDER => IS_PROVIDED_BY,
                    HAS_BILL => HAS_UTILITY_BILL,
                    _ => continue,
                };
                let Some(items) = value.as_array() else {
                    continue;
                };
                for item in items.iter().filter(|i| i.is_object()) {
                    let Some(item_mapping) = self.resolve(item) else {
                        warn!("{} item without id under account {}; stopping accounts", name, account_id);
                        return Ok(());
                    };
                    let Some(item_type) = item.exact_type() else {
                        continue;
                    };
                    self.build_twin(item, item_mapping.twin_id(), item_type, false);
                    self.relate(
                        account_id,
                        account_type.as_ref(),
                        relationship,
                        item_mapping.twin_id(),
                        item_type,
                        ContentMap::new(),
                    );
                }
            }

            self.observer
                .on_event(&SyncEvent::new(EventKind::AccountProcessed, account_id));
        }
        Ok(())
    }

    /// Spatial graph of one building
    pub async fn walk_spatial(&mut self, building_id: &str) -> IngestResult<()> {
        if self.stored_building(building_id).await?.is_none() {
            return Ok(());
        }
        self.resolve_source_connector().await?;

        let response = self
            .query(SourceQuery::Building {
                building_id: building_id.to_string(),
            })
            .await?;
        let Some(response) = response else {
            return Ok(());
        };
        for building in response.result_elements(Some("buildings")) {
            self.walk_place(building, None, None).await?;
        }
        Ok(())
    }

    /// Things of one building, optionally scoped to a connector, and their
    /// points when points are enabled
    pub async fn walk_building_things(&mut self, building_id: &str, connector_id: &str) -> IngestResult<()> {
        if self.stored_building(building_id).await?.is_none() {
            return Ok(());
        }
        self.resolve_source_connector().await?;

        let response = self
            .query(SourceQuery::BuildingThings {
                building_id: building_id.to_string(),
                connector_id: connector_id.to_string(),
            })
            .await?;
        let Some(response) = response else {
            return Ok(());
        };

        for element in response.result_elements(None) {
            let mut things: BTreeMap<String, TwinMapping> = BTreeMap::new();
            for thing in element.array_field("things").unwrap_or_default() {
                if !thing.is_object() {
                    continue;
                }
                if let Some(mapping) = self.walk_thing(thing).await? {
                    things.entry(mapping.twin_id().to_string()).or_insert(mapping);
                }
            }
            debug!("{} things found in building {}", things.len(), building_id);
            if !things.is_empty() {
                self.walk_points(&things).await?;
            }
        }
        Ok(())
    }
}
