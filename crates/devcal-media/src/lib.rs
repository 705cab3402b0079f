//! Calibration source handling: extension-based classification, still image
//! decoding through `image`, and video frame extraction through the system
//! `ffmpeg` / `ffprobe` executables.
//!
//! All frames come out as 8-bit grayscale [`devcal_core::Frame`]s.

mod classify;
mod still;
mod video;

use devcal_core::Frame;
use std::path::{Path, PathBuf};

pub use classify::{
    is_hidden, SourceClassifier, SourceKind, DEFAULT_STILL_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS,
};
pub use still::read_still;
pub use video::{FfmpegTools, FfmpegVideo, VideoSource};

#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("{tool} failed on {path}: {message}")]
    Tool {
        tool: String,
        path: PathBuf,
        message: String,
    },
}

/// Opens calibration sources of each kind.
pub trait MediaBackend {
    fn read_still(&self, path: &Path) -> Result<Frame, MediaError>;
    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>, MediaError>;
}

/// `image` for stills, `ffmpeg` for videos.
#[derive(Clone, Debug, Default)]
pub struct DefaultMedia {
    pub tools: FfmpegTools,
}

impl DefaultMedia {
    pub fn new(tools: FfmpegTools) -> Self {
        Self { tools }
    }
}

impl MediaBackend for DefaultMedia {
    fn read_still(&self, path: &Path) -> Result<Frame, MediaError> {
        read_still(path)
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>, MediaError> {
        Ok(Box::new(FfmpegVideo::open(path, &self.tools)?))
    }
}
