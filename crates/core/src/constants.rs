//! Constants used throughout the cinelink core crate.
//!
//! Environment keys and the defaults applied when a key or profile field is absent.

use std::time::Duration;

/// Registry API root.
pub const ENV_REGISTRY_URL: &str = "REGISTRY_URL";
/// Short registry name, used in log file names.
pub const ENV_REGISTRY_NAME: &str = "REGISTRY_NAME";
pub const ENV_REGISTRY_USERNAME: &str = "REGISTRY_USERNAME";
pub const ENV_REGISTRY_PASSWORD: &str = "REGISTRY_PASSWORD";
pub const ENV_REGISTRY_PAGE_SIZE: &str = "REGISTRY_PAGE_SIZE";

/// Imaging archive root.
pub const ENV_IMAGING_URL: &str = "IMAGING_URL";
pub const ENV_IMAGING_USERNAME: &str = "IMAGING_USERNAME";
pub const ENV_IMAGING_PASSWORD: &str = "IMAGING_PASSWORD";

/// Path of the program profile YAML.
pub const ENV_PROFILE: &str = "CINELINK_PROFILE";
/// Root of the scratch directory tree.
pub const ENV_SCRATCH_DIR: &str = "CINELINK_SCRATCH_DIR";
/// Directory for per-day log files; console only when unset.
pub const ENV_LOG_DIR: &str = "CINELINK_LOG_DIR";
/// ffmpeg executable.
pub const ENV_FFMPEG: &str = "CINELINK_FFMPEG";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";

pub const DEFAULT_PROFILE_PATH: &str = "config/profile.yaml";
pub const DEFAULT_SCRATCH_DIR: &str = ".";
pub const DEFAULT_FFMPEG: &str = "ffmpeg";
pub const DEFAULT_REGISTRY_NAME: &str = "registry";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum frame count for a clip to be worth a video (one second at the default rate).
pub const DEFAULT_MIN_FRAMES: u32 = 30;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_CODEC: &str = "mpeg4";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 40;

/// Media type used for uploads when the generated file cannot be sniffed.
pub const FALLBACK_VIDEO_MEDIA_TYPE: &str = "video/mp4";
