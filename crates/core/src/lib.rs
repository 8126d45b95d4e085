//! # cinelink core
//!
//! Finds registry encounters that are missing their ultrasound video, matches them to the
//! imaging archive by patient identifier and date, renders each matched instance's frames into a
//! video and attaches the result back to the encounter once the registry has stored it.
//!
//! ## Flow for one date
//!
//! 1. [`reconcile::Reconciler::prepare`]: fetch encounters, partition by "first video slot
//!    filled", drop duplicated tracked entities and patient identifiers
//! 2. [`reconcile::Reconciler::resolve`]: exactly one study with exactly one series per patient
//! 3. [`media::MediaPipeline::generate_video`]: frame-count floor, download, numeric sort, encode
//! 4. [`media::assign_slots`] then [`upload::UploadCoordinator::upload_and_attach`]
//!
//! [`orchestrator::Orchestrator`] sequences these, one candidate at a time.
//!
//! ## Configuration
//!
//! [`config::CoreConfig`] is resolved once by the binaries and passed down by reference; nothing
//! in this crate reads the environment on its own.

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod reconcile;
pub mod shutdown;
pub mod upload;

#[cfg(test)]
mod testing;

pub use config::{CoreConfig, MediaSettings, ProgramProfile, SlotMap, UploadSettings};
pub use error::{
    ConfigError, DataQualityIssue, EncodeError, MediaError, PipelineError, PipelineResult,
    Rejection, UploadError,
};
pub use media::{FfmpegEncoder, GeneratedVideo, MediaPipeline, VideoEncoder, VideoOutcome};
pub use orchestrator::{DateReport, LookbackReport, Orchestrator, Services};
pub use reconcile::{Reconciler, Resolution};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use upload::{PollPolicy, UploadCoordinator};
