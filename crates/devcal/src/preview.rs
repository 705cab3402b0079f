//! Post-calibration preview of retained frames, undistorted with the solved
//! model.

use devcal_core::{CalibrationResult, DisplayMode, Frame};
use devcal_solver::UndistortMap;
use image::GrayImage;
use log::{info, warn};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// What the viewer asked for after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewControl {
    Continue,
    Stop,
}

/// Shows one undistorted frame. With `wait` set the call blocks until the
/// viewer acknowledges the frame.
pub trait PreviewPresenter {
    fn present(
        &mut self,
        device: &str,
        index: usize,
        frame: &Frame,
        wait: bool,
    ) -> Result<PreviewControl, PreviewError>;
}

/// Saves previews as `<dir>/<device>/preview_NNN.png` and, when waiting,
/// reads one line from `input`: `q` stops, anything else continues.
pub struct FilePreview<R> {
    dir: PathBuf,
    input: R,
}

impl FilePreview<std::io::StdinLock<'static>> {
    pub fn stdin(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, std::io::stdin().lock())
    }
}

impl<R: BufRead> FilePreview<R> {
    pub fn new(dir: impl Into<PathBuf>, input: R) -> Self {
        Self {
            dir: dir.into(),
            input,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl<R: BufRead> PreviewPresenter for FilePreview<R> {
    fn present(
        &mut self,
        device: &str,
        index: usize,
        frame: &Frame,
        wait: bool,
    ) -> Result<PreviewControl, PreviewError> {
        let dir = self.dir.join(device);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("preview_{index:03}.png"));
        let img = GrayImage::from_raw(frame.width as u32, frame.height as u32, frame.data.clone())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "frame buffer size mismatch")
            })?;
        img.save(&path)?;
        info!("preview written to {}", path.display());

        if !wait {
            return Ok(PreviewControl::Continue);
        }
        eprint!("[{device}] frame {index}: Enter for next, q to quit preview > ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(PreviewControl::Stop);
        }
        Ok(if line.trim().eq_ignore_ascii_case("q") {
            PreviewControl::Stop
        } else {
            PreviewControl::Continue
        })
    }
}

/// Undistort and present the retained frames of one device.
///
/// The undistortion map is built once. Presenter failures are logged and end
/// the preview; they never fail the device. Returns the number of frames
/// shown.
pub fn run_preview(
    presenter: &mut dyn PreviewPresenter,
    device: &str,
    result: &CalibrationResult,
    frames: &[Frame],
    mode: DisplayMode,
) -> usize {
    if mode == DisplayMode::None || frames.is_empty() {
        return 0;
    }
    let Some(map) = UndistortMap::new(&result.camera_matrix(), &result.distortion(), result.image_size)
    else {
        warn!("{device}: cannot build undistortion map, preview skipped");
        return 0;
    };

    let wait = mode == DisplayMode::Interactive;
    let mut shown = 0;
    for (index, frame) in frames.iter().enumerate() {
        let Some(undistorted) = map.remap(frame) else {
            warn!("{device}: retained frame {index} has a different size, skipped");
            continue;
        };
        match presenter.present(device, index, &undistorted, wait) {
            Ok(PreviewControl::Continue) => shown += 1,
            Ok(PreviewControl::Stop) => {
                shown += 1;
                info!("{device}: preview stopped by user");
                break;
            }
            Err(e) => {
                warn!("{device}: preview failed: {e}");
                break;
            }
        }
    }
    shown
}
