//! Scratch directory service
//!
//! [`ScratchSpace`] hands out the per-instance frame directories and video paths described in
//! the crate docs. It is created once per run; every method is scoped to one instance.

use crate::constants::{FRAME_EXTENSION, IMAGES_FOLDER_NAME, VIDEOS_FOLDER_NAME, VIDEO_EXTENSION};
use crate::FilesError;
use cinelink_types::ArchiveId;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Scratch and output directories for one run.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    /// Canonicalised scratch root
    root: PathBuf,
}

impl ScratchSpace {
    /// Creates the scratch space rooted at `root`, creating `images/` and `videos/` as needed.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if `root` exists but is not a directory or
    /// cannot be created or canonicalised.
    pub fn new(root: &Path) -> Result<Self, FilesError> {
        if root.exists() && !root.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        for sub in [IMAGES_FOLDER_NAME, VIDEOS_FOLDER_NAME] {
            fs::create_dir_all(root.join(sub)).map_err(|e| {
                FilesError::InvalidRootDirectory(format!(
                    "Cannot create {}: {}",
                    root.join(sub).display(),
                    e
                ))
            })?;
        }

        let root = root.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the frames of `instance`.
    #[must_use]
    pub fn frames_dir(&self, instance: &ArchiveId) -> PathBuf {
        self.root.join(IMAGES_FOLDER_NAME).join(instance.as_str())
    }

    /// Path of the video generated for `instance`.
    #[must_use]
    pub fn video_path(&self, instance: &ArchiveId) -> PathBuf {
        self.root
            .join(VIDEOS_FOLDER_NAME)
            .join(format!("{}.{}", instance.as_str(), VIDEO_EXTENSION))
    }

    /// Empties (or creates) the frame directory of `instance` and returns its path.
    ///
    /// Frames left behind by an earlier attempt are never reused.
    pub fn reset_frames_dir(&self, instance: &ArchiveId) -> Result<PathBuf, FilesError> {
        let dir = self.frames_dir(instance);
        remove_dir_if_present(&dir)?;
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "prepared frame directory");
        Ok(dir)
    }

    /// Stores frame number `frame` of `instance`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::UnexpectedMediaType` if `bytes` does not sniff as an image.
    pub fn write_frame(
        &self,
        instance: &ArchiveId,
        frame: u32,
        bytes: &[u8],
    ) -> Result<PathBuf, FilesError> {
        let path = self
            .frames_dir(instance)
            .join(format!("{frame}.{FRAME_EXTENSION}"));

        if !infer::is_image(bytes) {
            let found = infer::get(bytes)
                .map(|kind| kind.mime_type().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(FilesError::UnexpectedMediaType {
                path: path.display().to_string(),
                expected: "image",
                found,
            });
        }

        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Frames of `instance` ordered by their numeric frame index.
    ///
    /// Files whose stem is not a number are ignored. `10.png` sorts after `9.png`.
    pub fn sorted_frames(&self, instance: &ArchiveId) -> Result<Vec<PathBuf>, FilesError> {
        let mut frames: Vec<(u32, PathBuf)> = Vec::new();

        for entry in fs::read_dir(self.frames_dir(instance))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXTENSION) {
                continue;
            }
            let index = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok());
            match index {
                Some(index) => frames.push((index, path)),
                None => tracing::debug!(path = %path.display(), "ignoring non-frame file"),
            }
        }

        frames.sort_by_key(|(index, _)| *index);
        Ok(frames.into_iter().map(|(_, path)| path).collect())
    }

    /// Removes the frame directory of `instance`, if any.
    pub fn discard_frames(&self, instance: &ArchiveId) -> Result<(), FilesError> {
        remove_dir_if_present(&self.frames_dir(instance))
    }

    /// Removes a generated video, if it still exists.
    pub fn discard_video(&self, path: &Path) -> Result<(), FilesError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    /// Best-effort media type of a stored file, sniffed from its content.
    pub fn media_type(&self, path: &Path) -> Result<Option<&'static str>, FilesError> {
        Ok(infer::get_from_path(path)?.map(|kind| kind.mime_type()))
    }
}

fn remove_dir_if_present(dir: &Path) -> Result<(), FilesError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesError::Io(e)),
    }
}
