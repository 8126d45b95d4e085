//! # Registry client
//!
//! Client for the clinical registry's REST API. The registry is the system of record for
//! encounters (visits with structured data values) and tracked entities (patients).
//!
//! This crate covers:
//! - paginated collection reads ([`RegistryClient::fetch_collection`])
//! - encounter and tracked-entity wire models with translation to flat domain types
//! - binary file-resource upload, storage-status lookup and attachment to an encounter field
//!
//! No retry happens here: any non-success HTTP status is returned as
//! [`RegistryError::Status`] and it is up to the caller to decide what that means for the run.

pub mod client;
pub mod config;
pub mod encounters;
pub mod file_resources;
pub mod tracked_entities;

pub use client::RegistryClient;
pub use config::RegistryConfig;
pub use encounters::{Encounter, EncounterScope};
pub use file_resources::{FileResourceHandle, StorageStatus, UploadedFile};
pub use tracked_entities::TrackedEntity;

/// Errors returned by the registry client.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The request could not be sent or the response body could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status
    #[error("registry returned {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// The response did not match the expected wire schema
    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid registry configuration: {0}")]
    InvalidConfig(String),
}

/// Type alias for Results that can fail with a [`RegistryError`].
pub type RegistryResult<T> = Result<T, RegistryError>;
