//! Connection settings for the registry.

use cinelink_types::{NonEmptyText, Secret};
use std::time::Duration;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default timeout applied to every registry request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry connection settings, resolved once at startup.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// API root, for example `https://registry.example.org/api`
    pub base_url: NonEmptyText,
    pub username: NonEmptyText,
    pub password: Secret,
    pub page_size: u32,
    pub timeout: Duration,
}

impl RegistryConfig {
    pub fn new(base_url: NonEmptyText, username: NonEmptyText, password: Secret) -> Self {
        Self {
            base_url,
            username,
            password,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL without a trailing slash.
    pub(crate) fn root(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}
