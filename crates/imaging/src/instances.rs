//! Instance metadata and per-frame previews.

use crate::client::{ensure_success, read_json, ImagingClient};
use crate::{ImagingError, ImagingResult};
use bytes::Bytes;
use cinelink_types::ArchiveId;
use reqwest::Method;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceWire {
    #[serde(default)]
    main_dicom_tags: InstanceTagsWire,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceTagsWire {
    #[serde(default)]
    number_of_frames: Option<String>,
}

impl ImagingClient {
    /// Number of frames in an instance; 0 when the archive reports none.
    ///
    /// # Errors
    ///
    /// Besides transport errors, a frame count that is not a non-negative integer is reported as
    /// [`ImagingError::Decode`].
    pub async fn frame_count(&self, instance: &ArchiveId) -> ImagingResult<u32> {
        let url = self.url(&format!("instances/{instance}"));
        let response = self.request(Method::GET, &url).send().await?;
        let wire: InstanceWire = read_json(response, &url).await?;

        match wire.main_dicom_tags.number_of_frames.as_deref().map(str::trim) {
            None | Some("") => Ok(0),
            Some(raw) => raw.parse::<u32>().map_err(|_| ImagingError::Decode {
                url,
                message: format!("NumberOfFrames is not a frame count: '{raw}'"),
            }),
        }
    }

    /// One frame of an instance rendered as a still image (PNG).
    pub async fn frame_preview(&self, instance: &ArchiveId, frame: u32) -> ImagingResult<Bytes> {
        let url = self.url(&format!("instances/{instance}/frames/{frame}/preview"));
        let response = self.request(Method::GET, &url).send().await?;
        let response = ensure_success(response, &url).await?;

        Ok(response.bytes().await?)
    }
}
