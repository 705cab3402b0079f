use devcal_core::{FrameDimensions, SolverError};
use devcal_media::MediaError;
use std::path::PathBuf;

use crate::io::ResultIoError;

/// Everything that can go wrong while calibrating one device.
///
/// Frame-level and source-level variants (`InsufficientFrames`,
/// `PatternNotFound`) are absorbed by the device run; the others end it.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("cannot access {path}: {source}")]
    SourceAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Decode(#[from] MediaError),
    #[error("frame size {found} differs from the first accepted frame {expected}")]
    DimensionMismatch {
        expected: FrameDimensions,
        found: FrameDimensions,
    },
    #[error("video has {total} frames, need at least {required}")]
    InsufficientFrames { total: usize, required: usize },
    #[error("no calibration pattern found in {0}")]
    PatternNotFound(PathBuf),
    #[error("no usable observations ({sources} sources processed, {observations} observations)")]
    NoUsableObservations { sources: usize, observations: usize },
    #[error("solver returned an invalid solution: {0}")]
    DegenerateSolution(String),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Write(#[from] ResultIoError),
}

impl CalibrationError {
    /// `true` for errors that end the device run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CalibrationError::InsufficientFrames { .. } | CalibrationError::PatternNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_level_errors_are_not_fatal() {
        let e = CalibrationError::InsufficientFrames {
            total: 10,
            required: 25,
        };
        assert!(!e.is_fatal());
        assert!(!CalibrationError::PatternNotFound("a.png".into()).is_fatal());
        let e = CalibrationError::DimensionMismatch {
            expected: FrameDimensions::new(640, 480),
            found: FrameDimensions::new(320, 240),
        };
        assert!(e.is_fatal());
        assert_eq!(
            e.to_string(),
            "frame size 320x240 differs from the first accepted frame 640x480"
        );
    }
}
