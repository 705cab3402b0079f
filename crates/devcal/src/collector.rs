use crate::CalibrationError;
use devcal_core::{
    CalibrationOptions, Frame, FrameDimensions, Observation, PatternDetector, PatternSize,
};
use log::{debug, warn};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a frame did not contribute an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EmptyFrame,
    PatternNotFound,
}

/// Outcome of [`ObservationCollector::process`] for a non-fatal frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl FrameVerdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, FrameVerdict::Accepted)
    }
}

const CORNER_MARK_RADIUS: i32 = 4;
const CORNER_MARK_VALUE: u8 = 255;

/// Accumulates the observations of one device run.
///
/// The first accepted frame fixes the frame size for the rest of the run.
pub struct ObservationCollector<'a> {
    detector: &'a dyn PatternDetector,
    pattern: PatternSize,
    options: CalibrationOptions,
    dimensions: Option<FrameDimensions>,
    observations: Vec<Observation>,
    retained: Vec<Frame>,
}

impl<'a> ObservationCollector<'a> {
    pub fn new(
        detector: &'a dyn PatternDetector,
        pattern: PatternSize,
        options: CalibrationOptions,
    ) -> Self {
        Self {
            detector,
            pattern,
            options,
            dimensions: None,
            observations: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Flip, detect and record one frame.
    ///
    /// Fails only with [`CalibrationError::DimensionMismatch`], which must end
    /// the device run.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn process(&mut self, mut frame: Frame) -> Result<FrameVerdict, CalibrationError> {
        if frame.is_empty() {
            debug!("empty frame skipped");
            return Ok(FrameVerdict::Rejected(RejectReason::EmptyFrame));
        }

        if self.options.flip_horizontal {
            frame.flip_horizontal();
        }
        if self.options.flip_vertical {
            frame.flip_vertical();
        }

        let observation = match self.detector.detect(&frame, self.pattern) {
            Some(obs) if obs.is_complete_for(self.pattern) => obs,
            Some(obs) => {
                warn!(
                    "detector returned {} points for a {} pattern, frame skipped",
                    obs.len(),
                    self.pattern
                );
                return Ok(FrameVerdict::Rejected(RejectReason::PatternNotFound));
            }
            None => return Ok(FrameVerdict::Rejected(RejectReason::PatternNotFound)),
        };

        let dims = frame.dimensions();
        match self.dimensions {
            Some(expected) if expected != dims => {
                return Err(CalibrationError::DimensionMismatch {
                    expected,
                    found: dims,
                });
            }
            Some(_) => {}
            None => self.dimensions = Some(dims),
        }

        let is_first = self.observations.is_empty();
        if self.options.display_mode.retains(is_first) {
            for p in &observation.points {
                frame.draw_cross(*p, CORNER_MARK_RADIUS, CORNER_MARK_VALUE);
            }
            self.retained.push(frame);
        }
        self.observations.push(observation);
        Ok(FrameVerdict::Accepted)
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn dimensions(&self) -> Option<FrameDimensions> {
        self.dimensions
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Annotated frames kept for the preview.
    pub fn retained(&self) -> &[Frame] {
        &self.retained
    }

    pub fn into_parts(self) -> (Vec<Observation>, Option<FrameDimensions>, Vec<Frame>) {
        (self.observations, self.dimensions, self.retained)
    }
}
