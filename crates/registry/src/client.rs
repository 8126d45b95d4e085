//! HTTP client for the registry REST API.

use crate::config::RegistryConfig;
use crate::{RegistryError, RegistryResult};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Sort order applied to every collection read so pages stay stable while walking them.
const COLLECTION_ORDER: &str = "created:ASC";

/// HTTP client for the registry.
///
/// One instance is built per run from an immutable [`RegistryConfig`]. All requests use HTTP
/// basic auth with the configured credentials.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] for a zero page size and
    /// [`RegistryError::Http`] if the underlying HTTP client cannot be built.
    pub fn new(config: RegistryConfig) -> RegistryResult<Self> {
        if config.page_size == 0 {
            return Err(RegistryError::InvalidConfig(
                "page size must be greater than zero".into(),
            ));
        }

        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Fetch every record of a collection resource, following the pager until the registry
    /// reports no further page.
    ///
    /// # Arguments
    ///
    /// * `resource` - collection name, also the key of the record array in each page
    /// * `fields` - field selection passed through as `fields=`
    /// * `filter` - optional `filter=` expression
    /// * `params` - extra query parameters appended verbatim
    ///
    /// # Returns
    ///
    /// All records in server order (`created:ASC`).
    ///
    /// # Errors
    ///
    /// Any non-success status aborts the walk with [`RegistryError::Status`]; a page that does
    /// not carry the `resource` array, or whose records do not decode as `T`, yields
    /// [`RegistryError::Decode`].
    pub async fn fetch_collection<T: DeserializeOwned>(
        &self,
        resource: &str,
        fields: &str,
        filter: Option<&str>,
        params: &[(&str, String)],
    ) -> RegistryResult<Vec<T>> {
        let url = self.url(&format!("{resource}.json"));
        let mut records = Vec::new();
        let mut page: u32 = 0;

        loop {
            page += 1;

            let mut query: Vec<(&str, String)> = vec![
                ("fields", fields.to_string()),
                ("pageSize", self.config.page_size.to_string()),
                ("page", page.to_string()),
                ("order", COLLECTION_ORDER.to_string()),
                ("totalPages", "true".to_string()),
                ("skipMeta", "true".to_string()),
            ];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }
            query.extend(params.iter().map(|(k, v)| (*k, v.clone())));

            tracing::debug!(%url, page, "fetching registry page");
            let response = self.request(Method::GET, &url).query(&query).send().await?;
            let body: Value = read_json(response, &url).await?;

            let (items, has_next_page) = split_page::<T>(body, resource, &url)?;
            records.extend(items);

            if !has_next_page {
                break;
            }
        }

        tracing::debug!(resource, pages = page, records = records.len(), "collection fetched");
        Ok(records)
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.root(), path)
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http.request(method, url).basic_auth(
            self.config.username.as_str(),
            Some(self.config.password.expose()),
        )
    }
}

/// Return the response unchanged if its status is a success, otherwise turn it into
/// [`RegistryError::Status`] carrying the response body.
pub(crate) async fn ensure_success(response: Response, url: &str) -> RegistryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(%url, status = status.as_u16(), "registry request failed");
    Err(RegistryError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

/// Check the status and decode the JSON body, reporting the failing field path on mismatch.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    url: &str,
) -> RegistryResult<T> {
    let response = ensure_success(response, url).await?;
    let bytes = response.bytes().await?;

    let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| decode_error(err, url))
}

pub(crate) fn decode_value<T: DeserializeOwned>(value: Value, url: &str) -> RegistryResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| decode_error(err, url))
}

fn decode_error(err: serde_path_to_error::Error<serde_json::Error>, url: &str) -> RegistryError {
    let path = err.path().to_string();
    let path = if path.is_empty() { "<root>".to_string() } else { path };
    RegistryError::Decode {
        url: url.to_string(),
        message: format!("schema mismatch at {path}: {}", err.into_inner()),
    }
}

/// Split one page into its records and whether the pager announces another page.
///
/// A page without a pager block is treated as the last page.
fn split_page<T: DeserializeOwned>(
    mut body: Value,
    resource: &str,
    url: &str,
) -> RegistryResult<(Vec<T>, bool)> {
    let has_next_page = body
        .get("pager")
        .and_then(|pager| pager.get("nextPage"))
        .is_some_and(|next| !next.is_null());

    let items = body
        .get_mut(resource)
        .map(Value::take)
        .ok_or_else(|| RegistryError::Decode {
            url: url.to_string(),
            message: format!("page does not contain a '{resource}' array"),
        })?;

    Ok((decode_value(items, url)?, has_next_page))
}
