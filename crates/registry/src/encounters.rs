//! Encounter wire models and queries.
//!
//! The registry calls encounters "events". Each carries a reference to its tracked entity and a
//! flat list of `{dataElement, value}` pairs, which is translated here into a map keyed by data
//! field id.

use crate::client::RegistryClient;
use crate::RegistryResult;
use chrono::NaiveDate;
use cinelink_types::Uid;
use serde::Deserialize;
use std::collections::BTreeMap;

const ENCOUNTER_RESOURCE: &str = "events";
const ENCOUNTER_FIELDS: &str = "event,trackedEntityInstance,dataValues[dataElement,value]";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Registry scope encounters are read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncounterScope {
    pub program: Uid,
    pub program_stage: Uid,
    /// Root org unit; encounters from all descendant org units are included.
    pub org_unit: Uid,
}

/// One registry encounter with its data values keyed by data field id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encounter {
    pub id: String,
    pub tracked_entity: Option<String>,
    pub data_values: BTreeMap<String, String>,
}

impl Encounter {
    /// Value of a data field, treating blank values as absent.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.data_values
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn has_value(&self, field: &str) -> bool {
        self.value(field).is_some()
    }
}

// ============================================================================
// Wire model
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncounterWire {
    event: String,
    #[serde(default)]
    tracked_entity_instance: Option<String>,
    #[serde(default)]
    data_values: Vec<DataValueWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataValueWire {
    data_element: String,
    #[serde(default)]
    value: Option<String>,
}

impl From<EncounterWire> for Encounter {
    fn from(wire: EncounterWire) -> Self {
        let data_values = wire
            .data_values
            .into_iter()
            .filter_map(|dv| dv.value.map(|value| (dv.data_element, value)))
            .collect();

        Self {
            id: wire.event,
            tracked_entity: wire.tracked_entity_instance.filter(|t| !t.is_empty()),
            data_values,
        }
    }
}

impl RegistryClient {
    /// Fetch all encounters in `scope` whose `date_field` equals `date`.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode failures from [`RegistryClient::fetch_collection`].
    pub async fn fetch_encounters(
        &self,
        scope: &EncounterScope,
        date_field: &Uid,
        date: NaiveDate,
    ) -> RegistryResult<Vec<Encounter>> {
        let filter = format!("{}:eq:{}", date_field, date.format("%Y-%m-%d"));
        let params = [
            ("program", scope.program.to_string()),
            ("programStage", scope.program_stage.to_string()),
            ("ou", scope.org_unit.to_string()),
            ("ouMode", "DESCENDANTS".to_string()),
        ];

        let wire: Vec<EncounterWire> = self
            .fetch_collection(ENCOUNTER_RESOURCE, ENCOUNTER_FIELDS, Some(&filter), &params)
            .await?;

        Ok(wire.into_iter().map(Encounter::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_client;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scope() -> EncounterScope {
        EncounterScope {
            program: Uid::parse("d6PLRyy8l9L").unwrap(),
            program_stage: Uid::parse("yvhfP9fmA3W").unwrap(),
            org_unit: Uid::parse("uDNvnDC9DHj").unwrap(),
        }
    }

    #[test]
    fn blank_values_count_as_absent() {
        let encounter = Encounter {
            id: "e1".into(),
            tracked_entity: None,
            data_values: BTreeMap::from([
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "  ".to_string()),
            ]),
        };

        assert_eq!(encounter.value("a"), Some("1"));
        assert!(!encounter.has_value("b"));
        assert!(!encounter.has_value("c"));
    }

    #[tokio::test]
    async fn fetch_encounters_filters_by_date_and_scope() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/events.json"))
            .and(query_param("filter", "aY2MfS8YVdd:eq:2024-03-07"))
            .and(query_param("program", "d6PLRyy8l9L"))
            .and(query_param("programStage", "yvhfP9fmA3W"))
            .and(query_param("ou", "uDNvnDC9DHj"))
            .and(query_param("ouMode", "DESCENDANTS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pager": { "page": 1 },
                "events": [
                    {
                        "event": "DOM98UXXmxV",
                        "trackedEntityInstance": "gCgxGS7V57A",
                        "dataValues": [
                            { "dataElement": "H2vzpa4ZFCf", "value": "1" },
                            { "dataElement": "rXdrl3bPegQ" }
                        ]
                    },
                    { "event": "Kx1aWq0pLmN" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let encounters = client
            .fetch_encounters(&scope(), &Uid::parse("aY2MfS8YVdd").unwrap(), date)
            .await
            .unwrap();

        assert_eq!(encounters.len(), 2);
        assert_eq!(encounters[0].id, "DOM98UXXmxV");
        assert_eq!(encounters[0].tracked_entity.as_deref(), Some("gCgxGS7V57A"));
        assert_eq!(encounters[0].value("H2vzpa4ZFCf"), Some("1"));
        assert!(!encounters[0].has_value("rXdrl3bPegQ"));
        assert_eq!(encounters[1].tracked_entity, None);
        assert!(encounters[1].data_values.is_empty());
    }
}
