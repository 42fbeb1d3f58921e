use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem and codec configuration for the media library.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Root of the active media tree (default: "./media")
    pub media_dir: PathBuf,

    /// Root of the trash area, flat layout (default: "./trash")
    pub trash_dir: PathBuf,

    /// Root of the thumbnail area (default: "./thumbnails")
    pub thumbnail_dir: PathBuf,

    /// Maximum upload size in bytes (default: 256 MB)
    pub max_upload_size: usize,

    /// Upper bound for a single external codec invocation (default: 600 s)
    pub ffmpeg_timeout: Duration,

    /// Default CRF for video transcodes, 0-51 scale (default: 23)
    pub default_crf: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("./media"),
            trash_dir: PathBuf::from("./trash"),
            thumbnail_dir: PathBuf::from("./thumbnails"),
            max_upload_size: 256 * 1024 * 1024, // 256 MB
            ffmpeg_timeout: Duration::from_secs(600),
            default_crf: 23,
        }
    }
}

impl MediaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            media_dir: env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.media_dir),

            trash_dir: env::var("TRASH_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.trash_dir),

            thumbnail_dir: env::var("THUMBNAIL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.thumbnail_dir),

            max_upload_size: env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_upload_size),

            ffmpeg_timeout: env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.ffmpeg_timeout),

            default_crf: env::var("DEFAULT_CRF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_crf),
        }
    }
}
