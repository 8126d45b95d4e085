//! Frame download and video encoding.
//!
//! [`MediaPipeline::generate_video`] turns one archive instance into one video file in the scratch
//! space, or explains why it did not. Encoding goes through the [`VideoEncoder`] trait; the
//! production [`FfmpegEncoder`] pipes the frames into an `ffmpeg` child process.

use crate::config::MediaSettings;
use crate::error::{EncodeError, MediaError, Rejection};
use async_trait::async_trait;
use cinelink_files::{frame_size, FrameSize, ScratchSpace};
use cinelink_types::{ArchiveId, Uid};
use imaging::ImagingClient;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Everything an encoder needs to produce one video.
#[derive(Debug)]
pub struct EncodeJob<'a> {
    /// Frames in playback order.
    pub frames: &'a [PathBuf],
    pub output: &'a Path,
    pub frame_rate: u32,
    pub codec: &'a str,
    /// Output size, taken from the first frame.
    pub size: FrameSize,
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncodeError>;
}

/// Encoder backed by the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn arguments(job: &EncodeJob<'_>) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "image2pipe".into(),
            "-framerate".into(),
            job.frame_rate.to_string(),
            "-i".into(),
            "-".into(),
            "-vf".into(),
            format!("scale={}:{}", job.size.width, job.size.height),
            "-c:v".into(),
            job.codec.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            job.output.display().to_string(),
        ]
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncodeError> {
        if job.frames.is_empty() {
            return Err(EncodeError::NoFrames);
        }

        let mut child = Command::new(&self.program)
            .args(Self::arguments(job))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EncodeError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            EncodeError::Io(std::io::Error::other("encoder stdin was not captured"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            EncodeError::Io(std::io::Error::other("encoder stderr was not captured"))
        })?;

        let writer = async move {
            for frame in job.frames {
                let bytes = tokio::fs::read(frame).await?;
                stdin.write_all(&bytes).await?;
            }
            stdin.shutdown().await
        };
        let reader = async move {
            let mut text = String::new();
            stderr.read_to_string(&mut text).await.map(|_| text)
        };
        let (written, stderr_text) = tokio::join!(writer, reader);
        let status = child.wait().await?;

        if !status.success() {
            return Err(EncodeError::Failed {
                status: status.to_string(),
                stderr: stderr_text.unwrap_or_default().trim().to_string(),
            });
        }
        written?;

        tracing::debug!(
            output = %job.output.display(),
            frames = job.frames.len(),
            size = %job.size,
            "encoded video"
        );
        Ok(())
    }
}

/// Result of [`MediaPipeline::generate_video`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    Generated(PathBuf),
    Rejected(Rejection),
}

/// A video placed in one of an encounter's slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub instance: ArchiveId,
    pub path: PathBuf,
    /// Ordinal position within the encounter's slots.
    pub slot_index: usize,
    pub field: Uid,
}

/// Place videos into slots in order.
///
/// Videos beyond the last slot are not assigned; their paths are returned so the caller can
/// discard them.
pub fn assign_slots(
    encounter_id: &str,
    videos: Vec<(ArchiveId, PathBuf)>,
    slots: &[Uid],
) -> (Vec<GeneratedVideo>, Vec<PathBuf>) {
    if videos.len() > slots.len() {
        tracing::warn!(
            encounter = encounter_id,
            videos = videos.len(),
            slots = slots.len(),
            "more videos than slots, keeping the first ones"
        );
    }

    let mut assigned = Vec::with_capacity(videos.len().min(slots.len()));
    let mut overflow = Vec::new();
    for (index, (instance, path)) in videos.into_iter().enumerate() {
        match slots.get(index) {
            Some(field) => assigned.push(GeneratedVideo {
                instance,
                path,
                slot_index: index,
                field: field.clone(),
            }),
            None => overflow.push(path),
        }
    }

    (assigned, overflow)
}

/// Downloads frames and encodes them.
pub struct MediaPipeline<'a> {
    imaging: &'a ImagingClient,
    scratch: &'a ScratchSpace,
    encoder: &'a dyn VideoEncoder,
    settings: &'a MediaSettings,
}

impl<'a> MediaPipeline<'a> {
    pub fn new(
        imaging: &'a ImagingClient,
        scratch: &'a ScratchSpace,
        encoder: &'a dyn VideoEncoder,
        settings: &'a MediaSettings,
    ) -> Self {
        Self {
            imaging,
            scratch,
            encoder,
            settings,
        }
    }

    /// Produce the video for `instance`, or a rejection when it has too few frames.
    ///
    /// # Errors
    ///
    /// Archive transport failures, scratch I/O failures and encoder failures. The frame
    /// directory is left in place when encoding fails.
    pub async fn generate_video(&self, instance: &ArchiveId) -> Result<VideoOutcome, MediaError> {
        let frames = self.imaging.frame_count(instance).await?;

        if frames == 0 {
            let rejection = Rejection::NoFrames {
                instance: instance.to_string(),
            };
            tracing::error!(%instance, "{rejection}");
            return Ok(VideoOutcome::Rejected(rejection));
        }
        if frames < self.settings.min_frames {
            let rejection = Rejection::BelowMinimum {
                instance: instance.to_string(),
                frames,
                minimum: self.settings.min_frames,
            };
            tracing::error!(%instance, "{rejection}");
            return Ok(VideoOutcome::Rejected(rejection));
        }

        self.scratch.reset_frames_dir(instance)?;
        for frame in 0..frames {
            let bytes = self.imaging.frame_preview(instance, frame).await?;
            self.scratch.write_frame(instance, frame, &bytes)?;
        }
        tracing::info!(%instance, frames, "downloaded frames");

        let sorted = self.scratch.sorted_frames(instance)?;
        let first = sorted.first().ok_or(EncodeError::NoFrames)?;
        let size = frame_size(first)?;
        let output = self.scratch.video_path(instance);

        let job = EncodeJob {
            frames: &sorted,
            output: &output,
            frame_rate: self.settings.frame_rate,
            codec: self.settings.codec.as_str(),
            size,
        };
        self.encoder.encode(&job).await?;
        self.scratch.discard_frames(instance)?;

        tracing::info!(%instance, video = %output.display(), "generated video");
        Ok(VideoOutcome::Generated(output))
    }
}
