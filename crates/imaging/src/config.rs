//! Connection settings for the imaging archive.

use cinelink_types::{NonEmptyText, Secret};
use std::time::Duration;

/// Default timeout applied to every archive request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ImagingConfig {
    /// Archive root, for example `https://pacs.example.org`
    pub base_url: NonEmptyText,
    pub username: NonEmptyText,
    pub password: Secret,
    pub timeout: Duration,
}

impl ImagingConfig {
    pub fn new(base_url: NonEmptyText, username: NonEmptyText, password: Secret) -> Self {
        Self {
            base_url,
            username,
            password,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}
