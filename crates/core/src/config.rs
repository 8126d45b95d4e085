//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the clients and
//! pipeline components as immutable values. Nothing below the binaries reads environment
//! variables; [`CoreConfig::from_lookup`] takes the lookup as a closure so tests can supply
//! their own values.
//!
//! Two sources feed it:
//! - environment (connection settings and credentials)
//! - a program profile YAML (registry scope, video slot map, media and upload settings)

use crate::constants::*;
use crate::error::{ConfigError, ConfigResult};
use cinelink_types::{NonEmptyText, Secret, Uid};
use imaging::ImagingConfig;
use registry::{EncounterScope, RegistryConfig};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Video slot map
// ============================================================================

/// Ordered video-attachment fields per pathology classification.
///
/// The classification values that appear as keys are the complete set of valid
/// classifications. The first slot of each list doubles as the "already has a video" marker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotMap(BTreeMap<String, Vec<Uid>>);

impl SlotMap {
    /// Build a slot map, rejecting empty lists and slots repeated within one classification.
    pub fn new(slots: BTreeMap<String, Vec<Uid>>) -> ConfigResult<Self> {
        if slots.is_empty() {
            return Err(ConfigError::InvalidProfile(
                "video_slots must define at least one pathology classification".into(),
            ));
        }

        for (classification, fields) in &slots {
            if classification.trim().is_empty() {
                return Err(ConfigError::InvalidProfile(
                    "video_slots contains a blank classification".into(),
                ));
            }
            if fields.is_empty() {
                return Err(ConfigError::InvalidProfile(format!(
                    "classification '{classification}' has no video slots"
                )));
            }
            let mut seen = BTreeSet::new();
            for field in fields {
                if !seen.insert(field) {
                    return Err(ConfigError::InvalidProfile(format!(
                        "classification '{classification}' lists slot {field} more than once"
                    )));
                }
            }
        }

        Ok(Self(slots))
    }

    /// Slots for a classification, or `None` if the classification is not known.
    pub fn slots_for(&self, classification: &str) -> Option<&[Uid]> {
        self.0.get(classification.trim()).map(Vec::as_slice)
    }

    /// Number of videos an encounter of this classification can hold.
    pub fn expected_videos(&self, classification: &str) -> Option<usize> {
        self.slots_for(classification).map(<[Uid]>::len)
    }

    pub fn classifications(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn all_fields(&self) -> impl Iterator<Item = &Uid> {
        self.0.values().flatten()
    }
}

// ============================================================================
// Program profile
// ============================================================================

/// Registry scope plus media and upload settings for one registry program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramProfile {
    pub scope: EncounterScope,
    /// Data field holding the ultrasound date encounters are selected by.
    pub date_field: Uid,
    pub pathology_field: Uid,
    /// Tracked-entity attribute used as the cross-system join key.
    pub patient_identifier_attribute: Uid,
    pub slots: SlotMap,
    pub media: MediaSettings,
    pub upload: UploadSettings,
    pub lookback_days: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSettings {
    pub min_frames: u32,
    pub frame_rate: u32,
    pub codec: NonEmptyText,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSettings {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileWire {
    program: Uid,
    program_stage: Uid,
    org_unit: Uid,
    date_field: Uid,
    pathology_field: Uid,
    patient_identifier_attribute: Uid,
    video_slots: BTreeMap<String, Vec<Uid>>,
    #[serde(default)]
    media: MediaWire,
    #[serde(default)]
    upload: UploadWire,
    #[serde(default = "default_lookback_days")]
    lookback_days: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct MediaWire {
    min_frames: u32,
    frame_rate: u32,
    codec: String,
}

impl Default for MediaWire {
    fn default() -> Self {
        Self {
            min_frames: DEFAULT_MIN_FRAMES,
            frame_rate: DEFAULT_FRAME_RATE,
            codec: DEFAULT_CODEC.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct UploadWire {
    poll_interval_secs: u64,
    max_poll_attempts: u32,
}

impl Default for UploadWire {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

impl ProgramProfile {
    /// Parse and validate a profile from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProfileSchema`] with the failing field path when the YAML does not
    /// match the schema (including malformed uids and unknown keys), and
    /// [`ConfigError::InvalidProfile`] when the values are inconsistent.
    pub fn parse(yaml_text: &str) -> ConfigResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire = serde_path_to_error::deserialize::<_, ProfileWire>(deserializer).map_err(
            |err| {
                let path = err.path().to_string();
                let path = if path.is_empty() { "<root>".to_string() } else { path };
                ConfigError::ProfileSchema {
                    path,
                    message: err.into_inner().to_string(),
                }
            },
        )?;

        let slots = SlotMap::new(wire.video_slots)?;

        for reserved in [&wire.date_field, &wire.pathology_field] {
            if slots.all_fields().any(|f| f == reserved) {
                return Err(ConfigError::InvalidProfile(format!(
                    "field {reserved} cannot be used as a video slot"
                )));
            }
        }
        if wire.media.min_frames == 0 {
            return Err(ConfigError::InvalidProfile(
                "media.min_frames must be greater than zero".into(),
            ));
        }
        if wire.media.frame_rate == 0 {
            return Err(ConfigError::InvalidProfile(
                "media.frame_rate must be greater than zero".into(),
            ));
        }
        if wire.upload.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidProfile(
                "upload.max_poll_attempts must be greater than zero".into(),
            ));
        }
        if wire.upload.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidProfile(
                "upload.poll_interval_secs must be greater than zero".into(),
            ));
        }
        if wire.lookback_days == 0 {
            return Err(ConfigError::InvalidProfile(
                "lookback_days must be greater than zero".into(),
            ));
        }
        let codec = NonEmptyText::new(&wire.media.codec)
            .map_err(|_| ConfigError::InvalidProfile("media.codec cannot be empty".into()))?;

        Ok(Self {
            scope: EncounterScope {
                program: wire.program,
                program_stage: wire.program_stage,
                org_unit: wire.org_unit,
            },
            date_field: wire.date_field,
            pathology_field: wire.pathology_field,
            patient_identifier_attribute: wire.patient_identifier_attribute,
            slots,
            media: MediaSettings {
                min_frames: wire.media.min_frames,
                frame_rate: wire.media.frame_rate,
                codec,
            },
            upload: UploadSettings {
                poll_interval: Duration::from_secs(wire.upload.poll_interval_secs),
                max_poll_attempts: wire.upload.max_poll_attempts,
            },
            lookback_days: wire.lookback_days,
        })
    }

    /// Read and parse a profile file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }
}

// ============================================================================
// Core configuration
// ============================================================================

/// Everything a run needs, resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    registry: RegistryConfig,
    registry_name: NonEmptyText,
    imaging: ImagingConfig,
    profile: ProgramProfile,
    scratch_dir: PathBuf,
    ffmpeg: PathBuf,
    log_dir: Option<PathBuf>,
}

impl CoreConfig {
    pub fn new(
        registry: RegistryConfig,
        registry_name: NonEmptyText,
        imaging: ImagingConfig,
        profile: ProgramProfile,
        scratch_dir: PathBuf,
        ffmpeg: PathBuf,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            registry,
            registry_name,
            imaging,
            profile,
            scratch_dir,
            ffmpeg,
            log_dir,
        }
    }

    /// Resolve configuration from a key lookup (normally the process environment) and the
    /// profile file it points at.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| -> ConfigResult<NonEmptyText> {
            let value = get(key).ok_or(ConfigError::Missing(key))?;
            NonEmptyText::new(value).map_err(|_| ConfigError::Missing(key))
        };
        let secret = |key: &'static str| -> ConfigResult<Secret> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .map(Secret::new)
                .ok_or(ConfigError::Missing(key))
        };

        let timeout = match get(ENV_HTTP_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(parse_positive(ENV_HTTP_TIMEOUT_SECS, &raw)?),
            None => DEFAULT_HTTP_TIMEOUT,
        };
        let page_size = match get(ENV_REGISTRY_PAGE_SIZE) {
            Some(raw) => u32::try_from(parse_positive(ENV_REGISTRY_PAGE_SIZE, &raw)?).map_err(
                |_| ConfigError::Invalid {
                    key: ENV_REGISTRY_PAGE_SIZE,
                    message: "too large".into(),
                },
            )?,
            None => registry::config::DEFAULT_PAGE_SIZE,
        };

        let registry = RegistryConfig::new(
            required(ENV_REGISTRY_URL)?,
            required(ENV_REGISTRY_USERNAME)?,
            secret(ENV_REGISTRY_PASSWORD)?,
        )
        .with_page_size(page_size)
        .with_timeout(timeout);

        let imaging = ImagingConfig::new(
            required(ENV_IMAGING_URL)?,
            required(ENV_IMAGING_USERNAME)?,
            secret(ENV_IMAGING_PASSWORD)?,
        )
        .with_timeout(timeout);

        let registry_name = match get(ENV_REGISTRY_NAME) {
            Some(name) => NonEmptyText::new(name).map_err(|_| ConfigError::Missing(ENV_REGISTRY_NAME))?,
            None => NonEmptyText::new(DEFAULT_REGISTRY_NAME)
                .map_err(|_| ConfigError::Missing(ENV_REGISTRY_NAME))?,
        };

        let profile_path = get(ENV_PROFILE).unwrap_or_else(|| DEFAULT_PROFILE_PATH.to_string());
        let profile = ProgramProfile::load(Path::new(&profile_path))?;

        Ok(Self::new(
            registry,
            registry_name,
            imaging,
            profile,
            PathBuf::from(get(ENV_SCRATCH_DIR).unwrap_or_else(|| DEFAULT_SCRATCH_DIR.into())),
            PathBuf::from(get(ENV_FFMPEG).unwrap_or_else(|| DEFAULT_FFMPEG.into())),
            get(ENV_LOG_DIR).map(PathBuf::from),
        ))
    }

    pub fn registry(&self) -> &RegistryConfig {
        &self.registry
    }

    pub fn registry_name(&self) -> &NonEmptyText {
        &self.registry_name
    }

    pub fn imaging(&self) -> &ImagingConfig {
        &self.imaging
    }

    pub fn profile(&self) -> &ProgramProfile {
        &self.profile
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

fn parse_positive(key: &'static str, raw: &str) -> ConfigResult<u64> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            message: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) const PROFILE_YAML: &str = r#"
program: d6PLRyy8l9L
program_stage: yvhfP9fmA3W
org_unit: uDNvnDC9DHj
date_field: aY2MfS8YVdd
pathology_field: H2vzpa4ZFCf
patient_identifier_attribute: ofdWjpgwzfe
video_slots:
  "1": [rXdrl3bPegQ, uZAhzWxZ7Er, SZHbLco7bNr, DZCtmkLFDRQ, H8yuwsOTmgY]
  "2": [g33y4QmwHz7]
"#;

    pub(crate) fn test_profile() -> ProgramProfile {
        ProgramProfile::parse(PROFILE_YAML).expect("test profile should parse")
    }

    #[test]
    fn profile_applies_defaults() {
        let profile = test_profile();

        assert_eq!(profile.scope.program.as_str(), "d6PLRyy8l9L");
        assert_eq!(profile.media.min_frames, DEFAULT_MIN_FRAMES);
        assert_eq!(profile.media.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(profile.media.codec.as_str(), DEFAULT_CODEC);
        assert_eq!(profile.upload.poll_interval, Duration::from_secs(5));
        assert_eq!(profile.upload.max_poll_attempts, DEFAULT_MAX_POLL_ATTEMPTS);
        assert_eq!(profile.lookback_days, 40);
    }

    #[test]
    fn shipped_profile_parses() {
        let shipped = ProgramProfile::parse(include_str!("../../../config/profile.yaml")).unwrap();

        assert_eq!(shipped, test_profile());
    }

    #[test]
    fn slot_map_orders_slots_per_classification() {
        let profile = test_profile();

        assert_eq!(profile.slots.expected_videos("1"), Some(5));
        assert_eq!(profile.slots.expected_videos("2"), Some(1));
        assert_eq!(profile.slots.expected_videos("3"), None);
        assert_eq!(
            profile.slots.slots_for("1").unwrap()[0].as_str(),
            "rXdrl3bPegQ"
        );
        assert_eq!(
            profile.slots.classifications().collect::<Vec<_>>(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn invalid_uid_reports_field_path() {
        let yaml = PROFILE_YAML.replace("g33y4QmwHz7", "not-a-uid");

        match ProgramProfile::parse(&yaml) {
            Err(ConfigError::ProfileSchema { path, .. }) => {
                assert!(path.starts_with("video_slots"), "path was {path}")
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = format!("{PROFILE_YAML}\nsurprise: true\n");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::ProfileSchema { .. })
        ));
    }

    #[test]
    fn repeated_slot_is_rejected() {
        let yaml = PROFILE_YAML.replace("uZAhzWxZ7Er", "rXdrl3bPegQ");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(_))
        ));
    }

    #[test]
    fn empty_slot_list_is_rejected() {
        let yaml = PROFILE_YAML.replace("[g33y4QmwHz7]", "[]");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(_))
        ));
    }

    #[test]
    fn pathology_field_cannot_be_a_slot() {
        let yaml = PROFILE_YAML.replace("[g33y4QmwHz7]", "[H2vzpa4ZFCf]");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(_))
        ));
    }

    #[test]
    fn zero_min_frames_is_rejected() {
        let yaml = format!("{PROFILE_YAML}media:\n  min_frames: 0\n");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(_))
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let yaml = format!("{PROFILE_YAML}upload:\n  poll_interval_secs: 0\n");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(message)) if message.contains("poll_interval_secs")
        ));
    }

    #[test]
    fn zero_lookback_is_rejected() {
        let yaml = format!("{PROFILE_YAML}lookback_days: 0\n");

        assert!(matches!(
            ProgramProfile::parse(&yaml),
            Err(ConfigError::InvalidProfile(message)) if message.contains("lookback_days")
        ));
    }

    fn env_with_profile(profile_path: &Path) -> HashMap<&'static str, String> {
        HashMap::from([
            (ENV_REGISTRY_URL, "https://registry.example.org/api".to_string()),
            (ENV_REGISTRY_USERNAME, "admin".to_string()),
            (ENV_REGISTRY_PASSWORD, "district".to_string()),
            (ENV_IMAGING_URL, "https://pacs.example.org".to_string()),
            (ENV_IMAGING_USERNAME, "orthanc".to_string()),
            (ENV_IMAGING_PASSWORD, "orthanc".to_string()),
            (ENV_PROFILE, profile_path.display().to_string()),
        ])
    }

    #[test]
    fn from_lookup_resolves_environment_and_profile() {
        let temp = TempDir::new().unwrap();
        let profile_path = temp.path().join("profile.yaml");
        fs::write(&profile_path, PROFILE_YAML).unwrap();
        let mut env = env_with_profile(&profile_path);
        env.insert(ENV_REGISTRY_PAGE_SIZE, "200".to_string());

        let cfg = CoreConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(cfg.registry().page_size, 200);
        assert_eq!(cfg.registry_name().as_str(), DEFAULT_REGISTRY_NAME);
        assert_eq!(cfg.ffmpeg(), Path::new(DEFAULT_FFMPEG));
        assert_eq!(cfg.log_dir(), None);
        assert_eq!(cfg.profile().slots.expected_videos("1"), Some(5));
        assert!(!format!("{cfg:?}").contains("district"));
    }

    #[test]
    fn from_lookup_reports_missing_credentials() {
        let temp = TempDir::new().unwrap();
        let profile_path = temp.path().join("profile.yaml");
        fs::write(&profile_path, PROFILE_YAML).unwrap();
        let mut env = env_with_profile(&profile_path);
        env.remove(ENV_IMAGING_PASSWORD);

        assert!(matches!(
            CoreConfig::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Missing(ENV_IMAGING_PASSWORD))
        ));
    }

    #[test]
    fn from_lookup_rejects_bad_page_size() {
        let temp = TempDir::new().unwrap();
        let profile_path = temp.path().join("profile.yaml");
        fs::write(&profile_path, PROFILE_YAML).unwrap();
        let mut env = env_with_profile(&profile_path);
        env.insert(ENV_REGISTRY_PAGE_SIZE, "0".to_string());

        assert!(matches!(
            CoreConfig::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::Invalid { key: ENV_REGISTRY_PAGE_SIZE, .. })
        ));
    }

    #[test]
    fn missing_profile_file_is_reported() {
        let temp = TempDir::new().unwrap();
        let env = env_with_profile(&temp.path().join("absent.yaml"));

        assert!(matches!(
            CoreConfig::from_lookup(|k| env.get(k).cloned()),
            Err(ConfigError::ProfileRead { .. })
        ));
    }
}
