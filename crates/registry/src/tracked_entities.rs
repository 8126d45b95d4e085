//! Tracked entity (patient) wire models and bulk lookup.

use crate::client::RegistryClient;
use crate::RegistryResult;
use serde::Deserialize;
use std::collections::BTreeMap;

const TRACKED_ENTITY_RESOURCE: &str = "trackedEntityInstances";
const TRACKED_ENTITY_FIELDS: &str = "trackedEntityInstance,attributes[attribute,value]";

/// Maximum number of ids sent in one lookup, keeping request URLs at a sane length.
pub const TRACKED_ENTITY_BATCH_SIZE: usize = 50;

/// A registry patient with its attributes keyed by attribute id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedEntity {
    pub id: String,
    pub attributes: BTreeMap<String, String>,
}

impl TrackedEntity {
    /// Value of an attribute, treating blank values as absent.
    pub fn attribute(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackedEntityWire {
    tracked_entity_instance: String,
    #[serde(default)]
    attributes: Vec<AttributeWire>,
}

#[derive(Debug, Deserialize)]
struct AttributeWire {
    attribute: String,
    #[serde(default)]
    value: Option<String>,
}

impl From<TrackedEntityWire> for TrackedEntity {
    fn from(wire: TrackedEntityWire) -> Self {
        let attributes = wire
            .attributes
            .into_iter()
            .filter_map(|a| a.value.map(|value| (a.attribute, value)))
            .collect();

        Self {
            id: wire.tracked_entity_instance,
            attributes,
        }
    }
}

impl RegistryClient {
    /// Fetch the tracked entities with the given ids.
    ///
    /// Ids are sent in batches of [`TRACKED_ENTITY_BATCH_SIZE`]. Entities the registry does not
    /// return are simply absent from the result; detecting that is left to the caller.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode failures from [`RegistryClient::fetch_collection`].
    pub async fn fetch_tracked_entities(
        &self,
        ids: &[String],
    ) -> RegistryResult<Vec<TrackedEntity>> {
        let mut entities = Vec::with_capacity(ids.len());

        for batch in ids.chunks(TRACKED_ENTITY_BATCH_SIZE) {
            let params = [("trackedEntityInstance", batch.join(";"))];
            let wire: Vec<TrackedEntityWire> = self
                .fetch_collection(
                    TRACKED_ENTITY_RESOURCE,
                    TRACKED_ENTITY_FIELDS,
                    None,
                    &params,
                )
                .await?;
            entities.extend(wire.into_iter().map(TrackedEntity::from));
        }

        Ok(entities)
    }
}
