//! Per-device camera intrinsics calibration.
//!
//! `devcal` walks a data root with one subdirectory per device, pulls
//! chessboard observations out of the still images and videos it finds,
//! solves for the camera matrix and distortion, and writes one JSON result
//! per device.
//!
//! The pipeline is layered:
//! - [`ObservationCollector`] turns frames into observations for one device.
//! - [`FrameSampler`] picks representative frames from a video.
//! - [`DeviceCalibrationRun`] drives one device from its directory listing to
//!   the written result.
//! - [`FleetOrchestrator`] runs every device and stops at the first failure.
//!
//! Detection, solving, decoding and result storage plug in through
//! [`PatternDetector`], [`IntrinsicsSolver`], [`MediaBackend`] and
//! [`ResultWriter`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use devcal::detect::ChessboardPatternDetector;
//! use devcal::{
//!     Collaborators, DefaultMedia, FleetOrchestrator, JsonResultWriter, NoPreview,
//!     PipelineConfig, PlanarIntrinsicsSolver,
//! };
//!
//! let cfg = PipelineConfig {
//!     square_size: 0.025,
//!     ..Default::default()
//! };
//! let detector = ChessboardPatternDetector::default();
//! let solver = PlanarIntrinsicsSolver::default();
//! let media = DefaultMedia::new(cfg.ffmpeg.clone());
//! let writer = JsonResultWriter::new(&cfg.output_dir);
//! let tools = Collaborators {
//!     detector: &detector,
//!     solver: &solver,
//!     media: &media,
//!     writer: &writer,
//! };
//! let report = FleetOrchestrator::new(&cfg, tools).run(&mut NoPreview)?;
//! println!("success: {}", report.status.is_success());
//! # Ok::<(), devcal::CalibrationError>(())
//! ```
//!
//! ## Features
//! - `detect` (default): chessboard detector built on `chess-corners` and
//!   `calib-targets`.
//! - `cli` (default): the `devcal` binary.
//! - `tracing`: `tracing` spans on the pipeline and a `tracing-subscriber`
//!   logger.

mod collector;
mod config;
mod device;
mod error;
mod fleet;
mod io;
mod preview;
mod sampler;

#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "detect")]
pub mod detect;

pub use collector::{FrameVerdict, ObservationCollector, RejectReason};
pub use config::{ConfigError, PipelineConfig};
pub use device::{
    list_sources, Collaborators, DeviceCalibrationRun, DeviceFailure, DevicePhase, DeviceReport,
    NoPreview, SourceTally,
};
pub use error::CalibrationError;
pub use fleet::{discover_devices, FleetOrchestrator, FleetReport, RunStatus};
pub use io::{read_result, write_result, JsonResultWriter, ResultIoError, ResultWriter};
pub use preview::{run_preview, FilePreview, PreviewControl, PreviewError, PreviewPresenter};
pub use sampler::{FrameSampler, SamplerConfig, SamplingReport, SlotCursor};

pub use devcal_core::{
    CalibrationFlags, CalibrationOptions, CalibrationResult, DisplayMode, Frame, FrameDimensions,
    IntrinsicsSolver, Observation, PatternDetector, PatternSize, ReferenceObjectPoints,
    SolverError, SolverOutput,
};
pub use devcal_media::{DefaultMedia, MediaBackend, MediaError, SourceClassifier, SourceKind, VideoSource};
pub use devcal_solver::{PlanarIntrinsicsSolver, PlanarSolverOptions, UndistortMap};

pub use devcal_core::init_with_level;
#[cfg(feature = "tracing")]
pub use devcal_core::init_tracing;
