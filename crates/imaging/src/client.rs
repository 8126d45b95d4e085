//! HTTP plumbing shared by the archive operations.

use crate::config::ImagingConfig;
use crate::{ImagingError, ImagingResult};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// HTTP client for the imaging archive.
#[derive(Debug, Clone)]
pub struct ImagingClient {
    config: ImagingConfig,
    http: Client,
}

impl ImagingClient {
    /// Create a new archive client.
    ///
    /// # Errors
    ///
    /// Returns [`ImagingError::Http`] if the underlying HTTP client cannot be built.
    pub fn new(config: ImagingConfig) -> ImagingResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
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

pub(crate) async fn ensure_success(response: Response, url: &str) -> ImagingResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(%url, status = status.as_u16(), "imaging archive request failed");
    Err(ImagingError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    url: &str,
) -> ImagingResult<T> {
    let response = ensure_success(response, url).await?;
    let bytes = response.bytes().await?;

    let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path.is_empty() { "<root>".to_string() } else { path };
        ImagingError::Decode {
            url: url.to_string(),
            message: format!("schema mismatch at {path}: {}", err.into_inner()),
        }
    })
}
