//! Shared fixtures for the pipeline tests.

use crate::error::EncodeError;
use crate::media::{EncodeJob, VideoEncoder};
use async_trait::async_trait;
use cinelink_files::FrameSize;
use cinelink_types::{NonEmptyText, Secret};
use imaging::{ImagingClient, ImagingConfig};
use registry::{RegistryClient, RegistryConfig};
use serde_json::json;
use std::sync::Mutex;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) fn registry_client(server: &MockServer) -> RegistryClient {
    let config = RegistryConfig::new(
        NonEmptyText::new(format!("{}/api", server.uri())).unwrap(),
        NonEmptyText::new("admin").unwrap(),
        Secret::new("district"),
    );
    RegistryClient::new(config).unwrap()
}

pub(crate) fn imaging_client(server: &MockServer) -> ImagingClient {
    let config = ImagingConfig::new(
        NonEmptyText::new(server.uri()).unwrap(),
        NonEmptyText::new("orthanc").unwrap(),
        Secret::new("orthanc"),
    );
    ImagingClient::new(config).unwrap()
}

/// Smallest byte sequence that sniffs as a PNG and carries a readable size.
pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[8, 2, 0, 0, 0, 0, 0, 0, 0]);
    bytes
}

/// Serve an instance with `frames` frames, each a 640x480 PNG.
pub(crate) async fn mount_instance(server: &MockServer, id: &str, frames: u32) {
    let tags = if frames == 0 {
        json!({})
    } else {
        json!({ "NumberOfFrames": frames.to_string() })
    };
    Mock::given(method("GET"))
        .and(path(format!("/instances/{id}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ID": id, "MainDicomTags": tags })),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(format!(r"^/instances/{id}/frames/\d+/preview$")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(png(640, 480)),
        )
        .mount(server)
        .await;
}

pub(crate) async fn mount_upload(server: &MockServer, id: &str, status: &str) {
    Mock::given(method("POST"))
        .and(path("/api/fileResources"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "httpStatus": "Accepted",
            "response": {
                "fileResource": { "id": id, "storageStatus": status }
            }
        })))
        .mount(server)
        .await;
}

/// Answer successive status lookups with `statuses`, repeating the last one. An empty
/// sequence expects no lookups at all.
pub(crate) async fn mount_status_sequence(server: &MockServer, id: &str, statuses: &[&str]) {
    let route = format!("/api/fileResources/{id}");
    let Some((last, first)) = statuses.split_last() else {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .expect(0)
            .mount(server)
            .await;
        return;
    };

    for status in first {
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": id, "storageStatus": status })),
            )
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": id, "storageStatus": last })),
        )
        .mount(server)
        .await;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedJob {
    /// Frame file names in the order they were handed to the encoder.
    pub frames: Vec<String>,
    pub frame_rate: u32,
    pub codec: String,
    pub size: FrameSize,
}

/// Encoder that records its jobs and writes a placeholder output file.
#[derive(Debug, Default)]
pub(crate) struct RecordingEncoder {
    jobs: Mutex<Vec<RecordedJob>>,
    fail: bool,
}

impl RecordingEncoder {
    pub(crate) fn failing() -> Self {
        Self {
            jobs: Mutex::default(),
            fail: true,
        }
    }

    pub(crate) fn jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoEncoder for RecordingEncoder {
    async fn encode(&self, job: &EncodeJob<'_>) -> Result<(), EncodeError> {
        self.jobs.lock().unwrap().push(RecordedJob {
            frames: job
                .frames
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect(),
            frame_rate: job.frame_rate,
            codec: job.codec.to_string(),
            size: job.size,
        });
        if self.fail {
            return Err(EncodeError::Failed {
                status: "exit status: 1".into(),
                stderr: "simulated failure".into(),
            });
        }
        std::fs::write(job.output, b"fake video")?;
        Ok(())
    }
}
