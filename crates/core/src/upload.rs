//! Upload, storage confirmation and attachment of generated videos.

use crate::config::UploadSettings;
use crate::constants::FALLBACK_VIDEO_MEDIA_TYPE;
use crate::error::UploadError;
use crate::shutdown::Shutdown;
use cinelink_files::ScratchSpace;
use cinelink_types::Uid;
use registry::{FileResourceHandle, RegistryClient, StorageStatus};
use std::path::Path;
use std::time::Duration;

/// How long to wait for the registry to store an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl From<&UploadSettings> for PollPolicy {
    fn from(settings: &UploadSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.max_poll_attempts,
        }
    }
}

/// Drives `UPLOADED -> STORED -> ATTACHED` for one video at a time.
pub struct UploadCoordinator<'a> {
    registry: &'a RegistryClient,
    scratch: &'a ScratchSpace,
    program: &'a Uid,
    policy: PollPolicy,
    shutdown: Shutdown,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(
        registry: &'a RegistryClient,
        scratch: &'a ScratchSpace,
        program: &'a Uid,
        policy: PollPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            registry,
            scratch,
            program,
            policy,
            shutdown,
        }
    }

    /// Upload `video`, wait until the registry has stored it, then set `field` of the encounter
    /// to the new file resource. The local video is deleted once attached.
    ///
    /// # Errors
    ///
    /// - [`UploadError::StorageTimeout`] if the upload is not stored within the poll policy
    /// - [`UploadError::Cancelled`] if shutdown is requested while waiting
    /// - [`UploadError::Registry`] for transport failures at any step
    ///
    /// The handle is never attached unless its last observed status was `STORED`.
    pub async fn upload_and_attach(
        &mut self,
        encounter_id: &str,
        video: &Path,
        field: &Uid,
    ) -> Result<FileResourceHandle, UploadError> {
        let media_type = self
            .scratch
            .media_type(video)?
            .filter(|m| m.starts_with("video/"))
            .unwrap_or(FALLBACK_VIDEO_MEDIA_TYPE);

        let uploaded = self.registry.upload_file(video, media_type).await?;
        tracing::info!(
            encounter = encounter_id,
            file_resource = %uploaded.handle,
            status = %uploaded.status,
            "uploaded video"
        );

        if !uploaded.status.is_stored() {
            self.wait_until_stored(&uploaded.handle).await?;
        }

        self.registry
            .attach_file_to_record(self.program, encounter_id, field, &uploaded.handle)
            .await?;
        self.scratch.discard_video(video)?;

        Ok(uploaded.handle)
    }

    async fn wait_until_stored(&mut self, handle: &FileResourceHandle) -> Result<(), UploadError> {
        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::warn!(file_resource = %handle, "cancelled while waiting for storage");
                    return Err(UploadError::Cancelled { handle: handle.clone() });
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            match self.registry.storage_status(handle).await? {
                StorageStatus::Stored => {
                    tracing::debug!(file_resource = %handle, attempt, "file resource stored");
                    return Ok(());
                }
                StorageStatus::Pending => {
                    tracing::debug!(file_resource = %handle, attempt, "file resource pending");
                }
                StorageStatus::Other(status) => {
                    tracing::warn!(
                        file_resource = %handle,
                        attempt,
                        %status,
                        "unexpected storage status, still waiting"
                    );
                }
            }
        }

        tracing::error!(
            file_resource = %handle,
            attempts = self.policy.max_attempts,
            "file resource was not stored in time"
        );
        Err(UploadError::StorageTimeout {
            handle: handle.clone(),
            attempts: self.policy.max_attempts,
        })
    }
}
