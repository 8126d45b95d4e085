//! Frame image headers.

use crate::FilesError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reads the dimensions of a PNG frame from its IHDR chunk.
///
/// Only the first 24 bytes are read.
pub fn frame_size(path: &Path) -> Result<FrameSize, FilesError> {
    let mut header = [0u8; 24];
    File::open(path)?
        .read_exact(&mut header)
        .map_err(|e| FilesError::UnreadableFrame(format!("{}: {}", path.display(), e)))?;

    // signature (8) | chunk length (4) | "IHDR" (4) | width (4) | height (4)
    if header[..8] != PNG_SIGNATURE || &header[12..16] != b"IHDR" {
        return Err(FilesError::UnreadableFrame(format!(
            "{}: not a PNG image",
            path.display()
        )));
    }

    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    if width == 0 || height == 0 {
        return Err(FilesError::UnreadableFrame(format!(
            "{}: zero-sized image",
            path.display()
        )));
    }

    Ok(FrameSize { width, height })
}
