//! File resources: binary upload, storage-status lookup and attachment to encounters.
//!
//! Uploads are stored asynchronously by the registry. A fresh upload reports `PENDING`; the
//! handle may only be attached to an encounter once a later lookup reports `STORED`.

use crate::client::{ensure_success, read_json, RegistryClient};
use crate::{RegistryError, RegistryResult};
use cinelink_types::Uid;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;

const FILE_RESOURCE_PATH: &str = "fileResources";

/// Opaque registry handle for an uploaded binary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileResourceHandle(String);

impl FileResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage state of a file resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageStatus {
    Pending,
    Stored,
    /// Any other value the registry reports (for example `FAILED`).
    Other(String),
}

impl StorageStatus {
    fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("STORED") => StorageStatus::Stored,
            Some("PENDING") | None => StorageStatus::Pending,
            Some(other) => StorageStatus::Other(other.to_string()),
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, StorageStatus::Stored)
    }
}

impl std::fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageStatus::Pending => f.write_str("PENDING"),
            StorageStatus::Stored => f.write_str("STORED"),
            StorageStatus::Other(other) => f.write_str(other),
        }
    }
}

/// Result of a successful upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    pub handle: FileResourceHandle,
    pub status: StorageStatus,
}

// ============================================================================
// Wire model
// ============================================================================

#[derive(Debug, Deserialize)]
struct UploadResponseWire {
    response: UploadResponseBodyWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponseBodyWire {
    file_resource: FileResourceWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResourceWire {
    id: String,
    #[serde(default)]
    storage_status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachRequestWire<'a> {
    program: &'a str,
    event: &'a str,
    data_values: [AttachDataValueWire<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachDataValueWire<'a> {
    data_element: &'a str,
    value: &'a str,
}

impl RegistryClient {
    /// Upload a file as a binary file resource.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] if the file cannot be read, or the usual transport/decode
    /// errors.
    pub async fn upload_file(&self, path: &Path, media_type: &str) -> RegistryResult<UploadedFile> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                RegistryError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("upload path has no file name: {}", path.display()),
                ))
            })?;

        let part = Part::bytes(bytes).file_name(file_name).mime_str(media_type)?;
        let form = Form::new().part("file", part);

        let url = self.url(FILE_RESOURCE_PATH);
        tracing::debug!(%url, path = %path.display(), "uploading file resource");
        let response = self.request(Method::POST, &url).multipart(form).send().await?;
        let wire: UploadResponseWire = read_json(response, &url).await?;

        let file_resource = wire.response.file_resource;
        Ok(UploadedFile {
            handle: FileResourceHandle(file_resource.id),
            status: StorageStatus::from_wire(file_resource.storage_status.as_deref()),
        })
    }

    /// Look up the current storage status of a file resource.
    pub async fn storage_status(&self, handle: &FileResourceHandle) -> RegistryResult<StorageStatus> {
        let url = self.url(&format!(
            "{FILE_RESOURCE_PATH}/{}",
            urlencoding::encode(handle.as_str())
        ));
        let response = self.request(Method::GET, &url).send().await?;
        let wire: FileResourceWire = read_json(response, &url).await?;

        Ok(StorageStatus::from_wire(wire.storage_status.as_deref()))
    }

    /// Set `field` of encounter `encounter_id` to the file resource `handle`.
    ///
    /// Re-sending the same attachment is accepted by the registry; no check for an existing
    /// value happens here.
    pub async fn attach_file_to_record(
        &self,
        program: &Uid,
        encounter_id: &str,
        field: &Uid,
        handle: &FileResourceHandle,
    ) -> RegistryResult<()> {
        let url = self.url(&format!(
            "events/{}/{}",
            urlencoding::encode(encounter_id),
            field
        ));
        let body = AttachRequestWire {
            program: program.as_str(),
            event: encounter_id,
            data_values: [AttachDataValueWire {
                data_element: field.as_str(),
                value: handle.as_str(),
            }],
        };

        let response = self.request(Method::PUT, &url).json(&body).send().await?;
        ensure_success(response, &url).await?;

        tracing::info!(
            encounter = encounter_id,
            field = %field,
            file_resource = %handle,
            "attached file resource to encounter"
        );
        Ok(())
    }
}
