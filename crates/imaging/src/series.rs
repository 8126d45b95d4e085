//! Series detail lookup.

use crate::client::{read_json, ImagingClient};
use crate::ImagingResult;
use cinelink_types::ArchiveId;
use reqwest::Method;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SeriesWire {
    #[serde(default)]
    instances: Vec<ArchiveId>,
}

impl ImagingClient {
    /// Instance ids of a series, in the order the archive lists them.
    pub async fn series_instances(&self, series: &ArchiveId) -> ImagingResult<Vec<ArchiveId>> {
        let url = self.url(&format!("series/{series}"));
        let response = self.request(Method::GET, &url).send().await?;
        let wire: SeriesWire = read_json(response, &url).await?;

        Ok(wire.instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_client;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn series_instances_keep_archive_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/series/series-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ID": "series-1",
                "Instances": ["inst-c", "inst-a", "inst-b"]
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let instances = client
            .series_instances(&ArchiveId::parse("series-1").unwrap())
            .await
            .unwrap();

        let ids: Vec<_> = instances.iter().map(ArchiveId::as_str).collect();
        assert_eq!(ids, vec!["inst-c", "inst-a", "inst-b"]);
    }
}
