//! Run configuration: defaults, optionally overridden by a JSON file, then by
//! command-line flags.

use crate::SamplerConfig;
use devcal_core::{CalibrationOptions, PatternSize};
use devcal_media::{FfmpegTools, SourceClassifier, DEFAULT_STILL_EXTENSIONS, DEFAULT_VIDEO_EXTENSIONS};
use devcal_solver::PlanarSolverOptions;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("square size must be a positive number, got {0}")]
    InvalidSquareSize(f64),
    #[error("pattern {0} is too small, need at least 2x2 interior corners")]
    InvalidPattern(PatternSize),
    #[error("sampler must take at least one frame per video")]
    NoSamplerSlots,
}

fn to_strings(exts: &[&str]) -> Vec<String> {
    exts.iter().map(|e| e.to_string()).collect()
}

fn default_still_extensions() -> Vec<String> {
    to_strings(DEFAULT_STILL_EXTENSIONS)
}

fn default_video_extensions() -> Vec<String> {
    to_strings(DEFAULT_VIDEO_EXTENSIONS)
}

/// Everything a fleet run needs besides the detector and solver themselves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// One subdirectory per device.
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub pattern: PatternSize,
    /// Edge length of one board square, in the unit of the results
    /// (meters on the command line).
    pub square_size: f64,
    /// Restrict the run to this device.
    pub device: Option<String>,
    pub options: CalibrationOptions,
    pub sampler: SamplerConfig,
    pub solver: PlanarSolverOptions,
    #[serde(default = "default_still_extensions")]
    pub still_extensions: Vec<String>,
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    pub ffmpeg: FfmpegTools,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("calibrations"),
            preview_dir: PathBuf::from("preview"),
            pattern: PatternSize::default(),
            square_size: 1.0,
            device: None,
            options: CalibrationOptions::default(),
            sampler: SamplerConfig::default(),
            solver: PlanarSolverOptions::default(),
            still_extensions: default_still_extensions(),
            video_extensions: default_video_extensions(),
            ffmpeg: FfmpegTools::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config from disk. Missing fields keep their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(ConfigError::InvalidSquareSize(self.square_size));
        }
        if self.pattern.columns < 2 || self.pattern.rows < 2 {
            return Err(ConfigError::InvalidPattern(self.pattern));
        }
        if self.sampler.frames == 0 {
            return Err(ConfigError::NoSamplerSlots);
        }
        Ok(())
    }

    pub fn classifier(&self) -> SourceClassifier {
        SourceClassifier::new(self.still_extensions.as_slice(), self.video_extensions.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcal_core::DisplayMode;
    use devcal_media::SourceKind;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.json");
        fs::write(
            &path,
            r#"{
                "square_size": 0.025,
                "pattern": { "columns": 7, "rows": 5 },
                "options": { "fix_aspect_ratio": true, "display_mode": "interactive" },
                "sampler": { "frames": 10 }
            }"#,
        )
        .expect("write");

        let cfg = PipelineConfig::load_json(&path).expect("load");
        assert_eq!(cfg.square_size, 0.025);
        assert_eq!(cfg.pattern, PatternSize { columns: 7, rows: 5 });
        assert!(cfg.options.fix_aspect_ratio);
        assert_eq!(cfg.options.display_mode, DisplayMode::Interactive);
        assert_eq!(cfg.sampler.frames, 10);
        assert_eq!(cfg.sampler.skip, 5);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert!(cfg.video_extensions.iter().any(|e| e == "mov"));
    }

    #[test]
    fn write_then_load_is_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.json");
        let cfg = PipelineConfig {
            device: Some("cam3".into()),
            square_size: 0.03,
            ..Default::default()
        };
        cfg.write_json(&path).expect("write");
        assert_eq!(PipelineConfig::load_json(&path).expect("load"), cfg);
    }

    #[test]
    fn square_size_must_be_positive() {
        for bad in [0.0, -1.0, f64::NAN] {
            let cfg = PipelineConfig {
                square_size: bad,
                ..Default::default()
            };
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidSquareSize(_))));
        }
    }

    #[test]
    fn degenerate_pattern_and_empty_sampler_are_rejected() {
        for pattern in [PatternSize::new(1, 6), PatternSize::new(9, 0)] {
            let cfg = PipelineConfig {
                pattern,
                ..Default::default()
            };
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPattern(p)) if p == pattern));
        }

        let mut cfg = PipelineConfig::default();
        cfg.sampler.frames = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::NoSamplerSlots)));

        cfg.sampler.frames = 1;
        cfg.pattern = PatternSize::new(2, 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn classifier_uses_configured_extensions() {
        let cfg = PipelineConfig {
            still_extensions: vec!["pgm".into()],
            ..Default::default()
        };
        let c = cfg.classifier();
        assert_eq!(c.classify(Path::new("a.pgm")), SourceKind::StillImage);
        assert_eq!(c.classify(Path::new("a.png")), SourceKind::Unknown);
        assert_eq!(c.classify(Path::new("a.avi")), SourceKind::Video);
    }
}
