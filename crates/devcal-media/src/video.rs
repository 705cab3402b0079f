use crate::still::decode_bytes;
use crate::MediaError;
use devcal_core::Frame;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Random-access frame source.
pub trait VideoSource {
    /// Total number of frames reported by the container.
    fn frame_count(&self) -> usize;

    /// Decode the frame at `index`. `Ok(None)` is an empty decode: the
    /// decoder produced no picture for that position.
    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>, MediaError>;
}

/// Locations of the external `ffmpeg` / `ffprobe` executables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Run `tool <input_args> -i <source> <output_args>` and collect its output.
fn run(
    tool: &Path,
    input_args: &[&str],
    source: &Path,
    output_args: &[&str],
) -> Result<Output, MediaError> {
    let output = Command::new(tool)
        .args(input_args)
        .arg("-i")
        .arg(source)
        .args(output_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| MediaError::Tool {
            tool: tool.display().to_string(),
            path: source.to_path_buf(),
            message: format!("spawn failed: {e}"),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Tool {
            tool: tool.display().to_string(),
            path: source.to_path_buf(),
            message: stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Parse the first packet count printed by `ffprobe -of csv=p=0`.
fn parse_frame_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .map(|l| l.trim().trim_end_matches(','))
        .find(|l| !l.is_empty())?
        .parse()
        .ok()
}

/// Video decoded by shelling out to `ffmpeg`, one frame per invocation.
#[derive(Clone, Debug)]
pub struct FfmpegVideo {
    path: PathBuf,
    tools: FfmpegTools,
    frame_count: usize,
}

impl FfmpegVideo {
    /// Ask ffprobe for the frame count of `path`.
    pub fn open(path: &Path, tools: &FfmpegTools) -> Result<Self, MediaError> {
        let out = run(
            &tools.ffprobe,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_packets",
                "-show_entries",
                "stream=nb_read_packets",
                "-of",
                "csv=p=0",
            ],
            path,
            &[],
        )?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        let frame_count = parse_frame_count(&stdout).ok_or_else(|| MediaError::Decode {
            path: path.to_path_buf(),
            reason: format!("no video stream frame count in ffprobe output {stdout:?}"),
        })?;
        debug!("{}: {frame_count} frames", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            tools: tools.clone(),
            frame_count,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(path = %self.path.display())))]
    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>, MediaError> {
        let select = format!("select=eq(n\\,{index})");
        let output = run(
            &self.tools.ffmpeg,
            &["-v", "error", "-nostdin"],
            &self.path,
            &[
                "-vf",
                select.as_str(),
                "-vframes",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-",
            ],
        )?;
        if output.stdout.is_empty() {
            return Ok(None);
        }
        decode_bytes(&output.stdout, &self.path).map(Some)
    }
}
