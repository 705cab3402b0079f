//! Core types and capability traits for per-device camera calibration.
//!
//! This crate is intentionally small. It does *not* depend on any concrete
//! pattern detector, solver or image decoder; those plug in through
//! [`PatternDetector`] and [`IntrinsicsSolver`].

mod capability;
mod frame;
mod intrinsics;
mod logger;
mod options;
mod pattern;

pub use capability::{IntrinsicsSolver, PatternDetector, SolverError};
pub use frame::{sample_bilinear, sample_bilinear_u8, Frame, FrameDimensions, FrameView};
pub use intrinsics::{CalibrationResult, DistortionCoefficients, SolverOutput};
pub use options::{CalibrationFlags, CalibrationOptions, DisplayMode};
pub use pattern::{Observation, ParsePatternSizeError, PatternSize, ReferenceObjectPoints};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
