//! cinelink scratch storage
//!
//! This crate owns the on-disk layout used while turning archive instances into videos.
//!
//! ## Design Principles
//!
//! - Every path is derived from a validated [`ArchiveId`], never from raw remote strings
//! - Frame directories are disposable: they are cleared before a download and removed after a
//!   successful encode
//! - One video file per instance, named by instance id
//! - Downloaded frames must sniff as images before they are accepted
//!
//! ## Layout
//!
//! ```text
//! <scratch root>/
//! ├── images/
//! │   └── <instance id>/
//! │       ├── 0.png
//! │       ├── 1.png
//! │       └── …
//! └── videos/
//!     └── <instance id>.mp4
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use cinelink_files::{ArchiveId, ScratchSpace};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scratch = ScratchSpace::new(Path::new("/var/lib/cinelink"))?;
//! let instance = ArchiveId::parse("d8527248-83bbb5c5-8a82879a-b0eff1d5-8b12019a")?;
//! let frames = scratch.sorted_frames(&instance)?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod frames;
mod scratch;

pub use cinelink_types::ArchiveId;
pub use constants::{FRAME_EXTENSION, IMAGES_FOLDER_NAME, VIDEOS_FOLDER_NAME, VIDEO_EXTENSION};
pub use frames::{frame_size, FrameSize};
pub use scratch::ScratchSpace;

/// Errors that can occur during scratch storage operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Scratch root cannot be created or is not a directory
    #[error("Invalid scratch directory: {0}")]
    InvalidRootDirectory(String),

    /// Content did not sniff as the expected kind of media
    #[error("Unexpected media type for {path}: expected {expected}, found {found}")]
    UnexpectedMediaType {
        path: String,
        expected: &'static str,
        found: String,
    },

    /// A frame image header could not be read
    #[error("Unreadable frame {0}")]
    UnreadableFrame(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
