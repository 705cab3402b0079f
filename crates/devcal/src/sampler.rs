//! Representative frame selection from a video.
//!
//! The video is split into `frames` equal slots. Each slot is tried at its
//! start position; a frame the collector rejects moves the attempt `skip`
//! frames further, up to `max_bad_attempts` times, before the slot is given
//! up. [`SlotCursor`] holds that bookkeeping; [`FrameSampler`] drives it
//! against a [`VideoSource`].

use crate::{CalibrationError, ObservationCollector};
use devcal_media::VideoSource;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Sampling policy for videos.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Slots per video (`K`).
    pub frames: usize,
    /// Frames skipped after each rejected attempt.
    pub skip: usize,
    /// Rejected attempts tolerated per slot before it is given up.
    pub max_bad_attempts: usize,
    /// Consecutive empty decodes at one position before the attempt counts
    /// as rejected.
    pub max_empty_reads: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frames: 25,
            skip: 5,
            max_bad_attempts: 5,
            max_empty_reads: 10,
        }
    }
}

/// Slot/retry state of one sampling pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotCursor {
    slots: usize,
    stride: usize,
    skip: usize,
    max_bad_attempts: usize,
    step: usize,
    bad_attempts: usize,
    filled: usize,
}

impl SlotCursor {
    /// Fails with [`CalibrationError::InsufficientFrames`] when the video is
    /// shorter than the slot count.
    pub fn new(total_frames: usize, config: &SamplerConfig) -> Result<Self, CalibrationError> {
        if total_frames < config.frames {
            return Err(CalibrationError::InsufficientFrames {
                total: total_frames,
                required: config.frames,
            });
        }
        Ok(Self {
            slots: config.frames,
            stride: total_frames.checked_div(config.frames).unwrap_or(0),
            skip: config.skip,
            max_bad_attempts: config.max_bad_attempts,
            step: 0,
            bad_attempts: 0,
            filled: 0,
        })
    }

    /// Frame index of the next attempt, `None` once every slot is done.
    ///
    /// Saturates at `usize::MAX`, which is past the end of any video.
    pub fn position(&self) -> Option<usize> {
        (!self.is_done()).then(|| {
            self.step
                .saturating_mul(self.stride)
                .saturating_add(self.bad_attempts.saturating_mul(self.skip))
        })
    }

    pub fn is_done(&self) -> bool {
        self.step >= self.slots
    }

    /// Record the outcome of the attempt at [`position`](Self::position).
    pub fn record(&mut self, accepted: bool) {
        if self.is_done() {
            return;
        }
        if accepted {
            self.filled += 1;
            self.advance();
        } else if self.bad_attempts < self.max_bad_attempts {
            self.bad_attempts += 1;
        } else {
            debug!("slot {} given up after {} attempts", self.step, self.bad_attempts + 1);
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.step += 1;
        self.bad_attempts = 0;
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Counters from one video.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SamplingReport {
    pub total_frames: usize,
    pub slots_attempted: usize,
    pub slots_filled: usize,
    /// Frames handed to the collector.
    pub attempts: usize,
    pub empty_reads: usize,
    /// Attempts whose position fell past the end of the video.
    pub out_of_range: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSampler {
    pub config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// Sample `video` into `collector`.
    ///
    /// Decode errors and dimension mismatches abort sampling and propagate.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(frames = video.frame_count())))]
    pub fn run(
        &self,
        video: &mut dyn VideoSource,
        collector: &mut ObservationCollector<'_>,
    ) -> Result<SamplingReport, CalibrationError> {
        let total = video.frame_count();
        let mut cursor = SlotCursor::new(total, &self.config)?;
        let mut report = SamplingReport {
            total_frames: total,
            slots_attempted: cursor.slots(),
            ..Default::default()
        };

        while let Some(pos) = cursor.position() {
            if pos >= total {
                report.out_of_range += 1;
                cursor.record(false);
                continue;
            }

            let mut empty = 0;
            let frame = loop {
                match video.read_frame(pos)? {
                    Some(frame) if !frame.is_empty() => break Some(frame),
                    _ => {
                        report.empty_reads += 1;
                        empty += 1;
                        if empty >= self.config.max_empty_reads.max(1) {
                            warn!("frame {pos}: {empty} empty decodes, treating as rejected");
                            break None;
                        }
                    }
                }
            };

            let accepted = match frame {
                Some(frame) => {
                    report.attempts += 1;
                    collector.process(frame)?.is_accepted()
                }
                None => false,
            };
            cursor.record(accepted);
        }

        report.slots_filled = cursor.filled();
        debug!(
            "sampled {}/{} slots with {} attempts ({} empty reads)",
            report.slots_filled, report.slots_attempted, report.attempts, report.empty_reads
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(frames: usize) -> SamplerConfig {
        SamplerConfig {
            frames,
            ..Default::default()
        }
    }

    #[test]
    fn short_video_is_rejected() {
        let err = SlotCursor::new(10, &config(25)).expect_err("short");
        assert!(matches!(
            err,
            CalibrationError::InsufficientFrames {
                total: 10,
                required: 25
            }
        ));
    }

    #[test]
    fn accepted_attempts_advance_by_stride() {
        let mut c = SlotCursor::new(100, &config(4)).expect("cursor");
        let mut seen = Vec::new();
        while let Some(pos) = c.position() {
            seen.push(pos);
            c.record(true);
        }
        assert_eq!(seen, vec![0, 25, 50, 75]);
        assert_eq!(c.filled(), 4);
    }

    #[test]
    fn rejections_shift_by_skip_then_give_up() {
        let cfg = SamplerConfig {
            frames: 2,
            skip: 3,
            max_bad_attempts: 2,
            ..Default::default()
        };
        let mut c = SlotCursor::new(20, &cfg).expect("cursor");
        let mut seen = Vec::new();
        while let Some(pos) = c.position() {
            seen.push(pos);
            // accept only the second attempt of slot 1
            c.record(pos == 13);
        }
        assert_eq!(seen, vec![0, 3, 6, 10, 13]);
        assert_eq!(c.filled(), 1);
    }

    #[test]
    fn slot_starts_are_strictly_increasing() {
        let mut c = SlotCursor::new(250, &SamplerConfig::default()).expect("cursor");
        let mut starts = Vec::new();
        let mut attempts = 0;
        while let Some(pos) = c.position() {
            if starts.len() == c.step() {
                starts.push(pos);
            }
            attempts += 1;
            c.record(false);
        }
        assert_eq!(starts.len(), 25);
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(attempts, 25 * 6);
        assert_eq!(c.filled(), 0);
    }

    #[test]
    fn huge_skip_saturates_instead_of_overflowing() {
        let cfg = SamplerConfig {
            frames: 2,
            skip: usize::MAX,
            max_bad_attempts: 3,
            ..Default::default()
        };
        let mut c = SlotCursor::new(40, &cfg).expect("cursor");
        let mut seen = Vec::new();
        while let Some(pos) = c.position() {
            seen.push(pos);
            c.record(false);
        }
        let max = usize::MAX;
        assert_eq!(seen, vec![0, max, max, max, 20, max, max, max]);
        assert_eq!(c.filled(), 0);
    }

    #[test]
    fn zero_slots_is_immediately_done() {
        let c = SlotCursor::new(0, &config(0)).expect("cursor");
        assert!(c.is_done());
        assert_eq!(c.position(), None);
    }
}
