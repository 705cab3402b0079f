use crate::MediaError;
use devcal_core::Frame;
use image::GrayImage;
use std::path::Path;

fn frame_from_gray(img: GrayImage) -> Option<Frame> {
    let (w, h) = img.dimensions();
    Frame::new(w as usize, h as usize, img.into_raw()).filter(|f| !f.is_empty())
}

/// Decode an encoded image held in memory into an 8-bit grayscale frame.
/// `path` names the source in errors.
pub(crate) fn decode_bytes(bytes: &[u8], path: &Path) -> Result<Frame, MediaError> {
    let decode_err = |reason: String| MediaError::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let img = image::load_from_memory(bytes)
        .map_err(|e| decode_err(e.to_string()))?
        .to_luma8();
    frame_from_gray(img).ok_or_else(|| decode_err("image has no pixels".into()))
}

/// Read a still image from disk as an 8-bit grayscale frame.
pub fn read_still(path: &Path) -> Result<Frame, MediaError> {
    let bytes = std::fs::read(path).map_err(|source| MediaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&bytes, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma};

    #[test]
    fn reads_png_as_grayscale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("board.png");
        let img = GrayImage::from_fn(8, 5, |x, y| Luma([(x * 10 + y) as u8]));
        img.save_with_format(&path, ImageFormat::Png).expect("save");

        let frame = read_still(&path).expect("decode");
        assert_eq!((frame.width, frame.height), (8, 5));
        assert_eq!(frame.get(3, 2), 32);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_still(&dir.path().join("nope.png")).expect_err("missing");
        assert!(matches!(err, MediaError::Io { .. }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").expect("write");
        let err = read_still(&path).expect_err("garbage");
        assert!(matches!(err, MediaError::Decode { .. }));
    }
}
