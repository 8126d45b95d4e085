/// Directory under the scratch root holding one frame directory per instance.
pub const IMAGES_FOLDER_NAME: &str = "images";

/// Directory under the scratch root holding generated videos.
pub const VIDEOS_FOLDER_NAME: &str = "videos";

/// Extension of downloaded frame previews.
pub const FRAME_EXTENSION: &str = "png";

/// Extension of generated videos.
pub const VIDEO_EXTENSION: &str = "mp4";
