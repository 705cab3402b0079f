use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a calibration source file holds, judged by its extension only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    StillImage,
    Video,
    Unknown,
}

pub const DEFAULT_STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff"];
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mpg", "mpeg", "avi", "mov", "mp4", "mkv"];

/// Extension-based source classifier.
///
/// Input is trusted local data: there is no content sniffing, so a renamed
/// file is classified by its new name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceClassifier {
    still: Vec<String>,
    video: Vec<String>,
}

impl Default for SourceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_STILL_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS)
    }
}

impl SourceClassifier {
    pub fn new<S: AsRef<str>>(still: &[S], video: &[S]) -> Self {
        let norm = |exts: &[S]| {
            exts.iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect()
        };
        Self {
            still: norm(still),
            video: norm(video),
        }
    }

    pub fn classify(&self, path: &Path) -> SourceKind {
        let Some(ext) = extension(path) else {
            return SourceKind::Unknown;
        };
        if self.still.iter().any(|e| *e == ext) {
            SourceKind::StillImage
        } else if self.video.iter().any(|e| *e == ext) {
            SourceKind::Video
        } else {
            SourceKind::Unknown
        }
    }
}

/// Lower-cased text after the last `.` of the file name.
fn extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Dot-files and dot-directories are never calibration sources or devices.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_case_insensitive_extension() {
        let c = SourceClassifier::default();
        assert_eq!(c.classify(Path::new("a/b/shot.JPG")), SourceKind::StillImage);
        assert_eq!(c.classify(Path::new("board.bmp")), SourceKind::StillImage);
        assert_eq!(c.classify(Path::new("sweep.Mov")), SourceKind::Video);
        assert_eq!(c.classify(Path::new("clip.mpeg")), SourceKind::Video);
        assert_eq!(c.classify(Path::new("notes.txt")), SourceKind::Unknown);
    }

    #[test]
    fn uses_the_last_dot_only() {
        let c = SourceClassifier::default();
        assert_eq!(c.classify(Path::new("take.1.avi")), SourceKind::Video);
        assert_eq!(c.classify(Path::new("avi.backup")), SourceKind::Unknown);
    }

    #[test]
    fn missing_extension_is_unknown() {
        let c = SourceClassifier::default();
        assert_eq!(c.classify(Path::new("README")), SourceKind::Unknown);
        assert_eq!(c.classify(Path::new("trailing.")), SourceKind::Unknown);
    }

    #[test]
    fn custom_sets_replace_defaults() {
        let c = SourceClassifier::new(&[".PNG"], &["webm"]);
        assert_eq!(c.classify(Path::new("x.png")), SourceKind::StillImage);
        assert_eq!(c.classify(Path::new("x.jpg")), SourceKind::Unknown);
        assert_eq!(c.classify(Path::new("x.webm")), SourceKind::Video);
    }

    #[test]
    fn hidden_entries() {
        assert!(is_hidden(Path::new("data/.DS_Store")));
        assert!(is_hidden(Path::new(".cam0")));
        assert!(!is_hidden(Path::new("data/cam0")));
    }
}
