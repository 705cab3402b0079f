//! Command-line surface of the `devcal` binary.

use crate::config::{ConfigError, PipelineConfig};
use clap::{ArgAction, Parser};
use devcal_core::{DisplayMode, PatternSize};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Calibrate camera intrinsics for every device directory under the data root",
    disable_help_flag = true
)]
pub struct Cli {
    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,

    /// Show the first accepted frame undistorted after calibration.
    #[arg(short = 'g')]
    pub first_frame_preview: bool,

    /// Step through every accepted frame undistorted after calibration.
    #[arg(short = 'i')]
    pub interactive: bool,

    /// Fix the principal point at the image centre.
    #[arg(short = 'p')]
    pub fix_principal_point: bool,

    /// Fix the aspect ratio (fx == fy).
    #[arg(short = 'a')]
    pub fix_aspect_ratio: bool,

    /// Assume zero tangential distortion.
    #[arg(short = 'z')]
    pub zero_tangential: bool,

    /// Flip frames horizontally before detection.
    #[arg(short = 'h')]
    pub flip_horizontal: bool,

    /// Flip frames vertically before detection.
    #[arg(short = 'v')]
    pub flip_vertical: bool,

    /// Edge length of one board square, in meters.
    pub square_size: String,

    /// Calibrate only this device.
    pub device: Option<String>,

    /// JSON config; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory with one subdirectory per device.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long)]
    pub preview_dir: Option<PathBuf>,

    /// Interior corners as COLSxROWS.
    #[arg(long)]
    pub pattern: Option<PatternSize>,

    /// Frames sampled per video.
    #[arg(long)]
    pub frames: Option<usize>,

    /// Frames skipped after a rejected video frame.
    #[arg(long)]
    pub skip: Option<usize>,

    /// Rejected attempts per video slot before giving up.
    #[arg(long)]
    pub max_bad_attempts: Option<usize>,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("invalid square size `{0}` (expected a positive number)")]
    InvalidSquareSize(String),
    #[error("cannot load config: {0}")]
    Config(#[from] ConfigError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidSquareSize(_) => 3,
            CliError::Config(ConfigError::InvalidSquareSize(_)) => 3,
            CliError::Config(_) => 2,
        }
    }
}

impl Cli {
    /// Defaults, then the JSON config, then the flags.
    pub fn resolve(&self) -> Result<PipelineConfig, CliError> {
        let square_size = self
            .square_size
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s > 0.0)
            .ok_or_else(|| CliError::InvalidSquareSize(self.square_size.clone()))?;

        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load_json(path)?,
            None => PipelineConfig::default(),
        };
        cfg.square_size = square_size;

        if let Some(device) = &self.device {
            cfg.device = Some(device.clone());
        }
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        if let Some(dir) = &self.preview_dir {
            cfg.preview_dir = dir.clone();
        }
        if let Some(pattern) = self.pattern {
            cfg.pattern = pattern;
        }
        if let Some(frames) = self.frames {
            cfg.sampler.frames = frames;
        }
        if let Some(skip) = self.skip {
            cfg.sampler.skip = skip;
        }
        if let Some(max) = self.max_bad_attempts {
            cfg.sampler.max_bad_attempts = max;
        }

        let opts = &mut cfg.options;
        opts.fix_principal_point |= self.fix_principal_point;
        opts.fix_aspect_ratio |= self.fix_aspect_ratio;
        opts.zero_tangential_distortion |= self.zero_tangential;
        opts.flip_horizontal |= self.flip_horizontal;
        opts.flip_vertical |= self.flip_vertical;
        if self.interactive {
            opts.display_mode = DisplayMode::Interactive;
        } else if self.first_frame_preview {
            opts.display_mode = DisplayMode::FirstFrameOnly;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
