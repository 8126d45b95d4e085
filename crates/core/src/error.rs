//! Error and outcome kinds for the pipeline.
//!
//! Three classes are kept apart so callers can match on them:
//! - transport failures ([`PipelineError::Registry`], [`PipelineError::Imaging`]) end the run
//!   for the current date
//! - data-quality issues ([`DataQualityIssue`]) skip one encounter or patient
//! - quality-floor rejections ([`Rejection`]) drop one instance

use cinelink_files::FilesError;
use imaging::ImagingError;
use registry::{FileResourceHandle, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("imaging archive error: {0}")]
    Imaging(#[from] ImagingError),
    #[error("scratch storage error: {0}")]
    Files(#[from] FilesError),
    #[error("video encoding error: {0}")]
    Encode(#[from] EncodeError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failures of the media pipeline for one instance.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("imaging archive error: {0}")]
    Imaging(#[from] ImagingError),
    #[error("scratch storage error: {0}")]
    Files(#[from] FilesError),
    #[error("video encoding error: {0}")]
    Encode(#[from] EncodeError),
}

impl From<MediaError> for PipelineError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Imaging(e) => PipelineError::Imaging(e),
            MediaError::Files(e) => PipelineError::Files(e),
            MediaError::Encode(e) => PipelineError::Encode(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The encoder executable could not be started
    #[error("failed to start encoder: {0}")]
    Spawn(std::io::Error),
    /// The encoder ran and reported failure
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("nothing to encode")]
    NoFrames,
    #[error("I/O error while encoding: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the upload → stored → attached handoff for one video.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("file resource {handle} not stored after {attempts} status checks")]
    StorageTimeout {
        handle: FileResourceHandle,
        attempts: u32,
    },
    #[error("cancelled while waiting for file resource {handle}")]
    Cancelled { handle: FileResourceHandle },
    #[error("scratch storage error: {0}")]
    Files(#[from] FilesError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("failed to read profile {path}: {source}")]
    ProfileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("profile schema mismatch at {path}: {message}")]
    ProfileSchema { path: String, message: String },
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A data problem that excludes one encounter or patient from processing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataQualityIssue {
    #[error("encounter {encounter} has no pathology classification")]
    MissingPathology { encounter: String },
    #[error("encounter {encounter} has unknown pathology classification '{value}'")]
    UnknownPathology { encounter: String, value: String },
    #[error("encounter {encounter} has no tracked entity")]
    MissingTrackedEntity { encounter: String },
    #[error("tracked entity {tracked_entity} has more than one encounter without video: {encounters:?}")]
    DuplicateTrackedEntity {
        tracked_entity: String,
        encounters: Vec<String>,
    },
    #[error("tracked entity {tracked_entity} (encounter {encounter}) was not returned by the registry")]
    TrackedEntityNotReturned {
        tracked_entity: String,
        encounter: String,
    },
    #[error("tracked entity {tracked_entity} (encounter {encounter}) has no patient identifier")]
    MissingPatientIdentifier {
        tracked_entity: String,
        encounter: String,
    },
    #[error("patient identifier {identifier} is shared by encounters {encounters:?}")]
    DuplicatePatientIdentifier {
        identifier: String,
        encounters: Vec<String>,
    },
    #[error("patient identifier {identifier} matches more than one study: {studies:?}")]
    AmbiguousStudy {
        identifier: String,
        studies: Vec<String>,
    },
    #[error("study {study} for patient identifier {identifier} has {series} series, expected exactly one")]
    AmbiguousSeries {
        identifier: String,
        study: String,
        series: usize,
    },
    #[error("encounter {encounter} has {instances} instances but only {slots} video slots")]
    TooManyInstances {
        encounter: String,
        instances: usize,
        slots: usize,
    },
}

impl DataQualityIssue {
    /// Missing registry data is a warning; everything else is an error.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            DataQualityIssue::TrackedEntityNotReturned { .. }
                | DataQualityIssue::MissingPatientIdentifier { .. }
        )
    }

    pub fn log(&self) {
        if self.is_warning() {
            tracing::warn!(issue = %self, "data quality warning");
        } else {
            tracing::error!(issue = %self, "data quality error");
        }
    }
}

/// Why an instance produced no video.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("instance {instance} contains no frames")]
    NoFrames { instance: String },
    #[error("instance {instance} contains {frames} frames, less than the minimum ({minimum})")]
    BelowMinimum {
        instance: String,
        frames: u32,
        minimum: u32,
    },
}
