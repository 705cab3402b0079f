//! Narrow interfaces to the two numerical collaborators of the pipeline.

use crate::{CalibrationFlags, Frame, FrameDimensions, Observation, PatternSize, SolverOutput};
use nalgebra::Point3;

/// Finds the target corners in a frame.
///
/// Implementations return `Some` only for a complete detection: one point per
/// corner of `pattern`, ordered row-major.
pub trait PatternDetector {
    fn detect(&self, frame: &Frame, pattern: PatternSize) -> Option<Observation>;
}

impl<F> PatternDetector for F
where
    F: Fn(&Frame, PatternSize) -> Option<Observation>,
{
    fn detect(&self, frame: &Frame, pattern: PatternSize) -> Option<Observation> {
        self(frame, pattern)
    }
}

/// Errors reported by an [`IntrinsicsSolver`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("need at least {required} views, got {got}")]
    NotEnoughViews { got: usize, required: usize },
    #[error("view {view}: {object} object points vs {image} image points")]
    MismatchedView {
        view: usize,
        object: usize,
        image: usize,
    },
    #[error("object points of view {view} are not planar (z != 0)")]
    NonPlanarTarget { view: usize },
    #[error("degenerate configuration: {0}")]
    Degenerate(String),
}

/// Estimates intrinsics from planar target observations.
pub trait IntrinsicsSolver {
    fn calibrate(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Observation],
        image_size: FrameDimensions,
        flags: CalibrationFlags,
    ) -> Result<SolverOutput, SolverError>;
}
