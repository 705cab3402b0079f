//! Calibration of a single device directory.

use crate::preview::{run_preview, PreviewPresenter};
use crate::{
    CalibrationError, FrameSampler, FrameVerdict, ObservationCollector, PipelineConfig,
    ResultWriter, SamplingReport,
};
use devcal_core::{
    CalibrationResult, FrameDimensions, IntrinsicsSolver, PatternDetector, ReferenceObjectPoints,
    SolverOutput,
};
use devcal_media::{is_hidden, MediaBackend, SourceClassifier, SourceKind};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Where a device run is, or where it stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePhase {
    Idle,
    Enumerating,
    Accumulating,
    Solving,
    Validating,
    Writing,
    Done,
    Failed,
}

impl std::fmt::Display for DevicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DevicePhase::Idle => "idle",
            DevicePhase::Enumerating => "enumerating",
            DevicePhase::Accumulating => "accumulating",
            DevicePhase::Solving => "solving",
            DevicePhase::Validating => "validating",
            DevicePhase::Writing => "writing",
            DevicePhase::Done => "done",
            DevicePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-kind source counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceTally {
    pub seen: usize,
    pub stills: usize,
    pub videos: usize,
    pub unknown: usize,
    /// Sources that went through the collector without a source-level error.
    pub processed: usize,
    /// Sources skipped after a non-fatal error.
    pub skipped: usize,
}

/// Everything known about a device run, successful or not.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceReport {
    pub device: String,
    pub phase: DevicePhase,
    pub sources: SourceTally,
    pub observations: usize,
    pub image_size: Option<FrameDimensions>,
    pub sampling: Vec<(PathBuf, SamplingReport)>,
    pub result: Option<CalibrationResult>,
    pub output: Option<PathBuf>,
    pub previewed: usize,
}

impl DeviceReport {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            phase: DevicePhase::Idle,
            sources: SourceTally::default(),
            observations: 0,
            image_size: None,
            sampling: Vec::new(),
            result: None,
            output: None,
            previewed: 0,
        }
    }
}

/// A device run that ended early. `report.result` is set when the failure
/// happened while writing an already computed result.
#[derive(Debug, thiserror::Error)]
#[error("device {} failed while {phase}: {error}", .report.device)]
pub struct DeviceFailure {
    pub phase: DevicePhase,
    #[source]
    pub error: CalibrationError,
    pub report: Box<DeviceReport>,
}

/// The pluggable parts of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub detector: &'a dyn PatternDetector,
    pub solver: &'a dyn IntrinsicsSolver,
    pub media: &'a dyn MediaBackend,
    pub writer: &'a dyn ResultWriter,
}

pub(crate) fn access_error(path: &Path, source: std::io::Error) -> CalibrationError {
    CalibrationError::SourceAccess {
        path: path.to_path_buf(),
        source,
    }
}

/// Regular, non-hidden files of `dir`, sorted by name.
pub fn list_sources(dir: &Path) -> Result<Vec<PathBuf>, CalibrationError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| access_error(dir, e))? {
        let entry = entry.map_err(|e| access_error(dir, e))?;
        let path = entry.path();
        if is_hidden(&path) {
            debug!("skipping hidden entry {}", path.display());
            continue;
        }
        let meta = fs::metadata(&path).map_err(|e| access_error(&path, e))?;
        if !meta.is_file() {
            debug!("skipping non-file entry {}", path.display());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn validate_solution(out: &SolverOutput) -> Result<(), CalibrationError> {
    let invalid = |what: String| -> Result<(), CalibrationError> {
        Err(CalibrationError::DegenerateSolution(what))
    };
    if !out.camera_matrix.iter().all(|v| v.is_finite()) {
        return invalid("camera matrix is not finite".into());
    }
    if out.fx() <= 0.0 || out.fy() <= 0.0 {
        return invalid(format!(
            "non-positive focal length (fx = {}, fy = {})",
            out.fx(),
            out.fy()
        ));
    }
    if !out.distortion.all_finite() {
        return invalid("distortion coefficients are not finite".into());
    }
    if !(out.reprojection_error.is_finite() && out.reprojection_error >= 0.0) {
        return invalid(format!(
            "invalid reprojection error {}",
            out.reprojection_error
        ));
    }
    Ok(())
}

/// Runs one device through enumerate, accumulate, solve, validate, write and
/// preview.
pub struct DeviceCalibrationRun<'a> {
    config: &'a PipelineConfig,
    classifier: SourceClassifier,
    reference: ReferenceObjectPoints,
    tools: Collaborators<'a>,
}

impl<'a> DeviceCalibrationRun<'a> {
    pub fn new(config: &'a PipelineConfig, tools: Collaborators<'a>) -> Self {
        Self {
            config,
            classifier: config.classifier(),
            reference: ReferenceObjectPoints::new(config.pattern, config.square_size),
            tools,
        }
    }

    /// Calibrate the device `name` whose sources live in `dir`.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, dir, presenter)))]
    pub fn run(
        &self,
        name: &str,
        dir: &Path,
        presenter: &mut dyn PreviewPresenter,
    ) -> Result<DeviceReport, DeviceFailure> {
        info!("{name}: calibrating from {}", dir.display());
        let mut report = DeviceReport::new(name);
        match self.run_phases(dir, &mut report, presenter) {
            Ok(()) => {
                report.phase = DevicePhase::Done;
                info!(
                    "{name}: done, {} observations from {}/{} sources, rms {:.4}",
                    report.observations,
                    report.sources.processed,
                    report.sources.seen,
                    report.result.as_ref().map_or(f64::NAN, |r| r.reprojection_error)
                );
                Ok(report)
            }
            Err(error) => {
                let phase = report.phase;
                error!("{name}: failed while {phase}: {error}");
                report.phase = DevicePhase::Failed;
                Err(DeviceFailure {
                    phase,
                    error,
                    report: Box::new(report),
                })
            }
        }
    }

    fn run_phases(
        &self,
        dir: &Path,
        report: &mut DeviceReport,
        presenter: &mut dyn PreviewPresenter,
    ) -> Result<(), CalibrationError> {
        let name = report.device.clone();

        report.phase = DevicePhase::Enumerating;
        let sources = list_sources(dir)?;
        report.sources.seen = sources.len();

        report.phase = DevicePhase::Accumulating;
        let mut collector =
            ObservationCollector::new(self.tools.detector, self.config.pattern, self.config.options);
        for path in &sources {
            self.accumulate(path, &mut collector, report)?;
        }
        let (observations, dims, retained) = collector.into_parts();
        report.observations = observations.len();
        report.image_size = dims;

        report.phase = DevicePhase::Solving;
        let dims = match dims {
            Some(d) if !observations.is_empty() && report.sources.processed > 0 => d,
            _ => {
                return Err(CalibrationError::NoUsableObservations {
                    sources: report.sources.processed,
                    observations: observations.len(),
                })
            }
        };
        let object_points = self.reference.repeat(observations.len());
        let out = self.tools.solver.calibrate(
            &object_points,
            &observations,
            dims,
            self.config.options.solver_flags(),
        )?;

        report.phase = DevicePhase::Validating;
        validate_solution(&out)?;
        let result = CalibrationResult::from_solver(&out, dims, observations.len());
        report.result = Some(result.clone());

        report.phase = DevicePhase::Writing;
        let path = self.tools.writer.write(&name, &result)?;
        info!("{name}: result written to {}", path.display());
        report.output = Some(path);

        report.previewed = run_preview(
            presenter,
            &name,
            &result,
            &retained,
            self.config.options.display_mode,
        );
        Ok(())
    }

    fn accumulate(
        &self,
        path: &Path,
        collector: &mut ObservationCollector<'_>,
        report: &mut DeviceReport,
    ) -> Result<(), CalibrationError> {
        match self.classifier.classify(path) {
            SourceKind::Unknown => {
                report.sources.unknown += 1;
                info!("skipping {} (unknown type)", path.display());
            }
            SourceKind::StillImage => {
                report.sources.stills += 1;
                let frame = self.tools.media.read_still(path)?;
                let verdict = collector.process(frame)?;
                report.sources.processed += 1;
                if let FrameVerdict::Rejected(reason) = verdict {
                    warn!(
                        "{}",
                        CalibrationError::PatternNotFound(path.to_path_buf())
                    );
                    debug!("{}: rejected ({reason:?})", path.display());
                }
            }
            SourceKind::Video => {
                report.sources.videos += 1;
                let mut video = self.tools.media.open_video(path)?;
                let sampler = FrameSampler::new(self.config.sampler);
                match sampler.run(video.as_mut(), collector) {
                    Ok(sampling) => {
                        report.sources.processed += 1;
                        if sampling.slots_filled == 0 {
                            warn!("{}", CalibrationError::PatternNotFound(path.to_path_buf()));
                        }
                        report.sampling.push((path.to_path_buf(), sampling));
                    }
                    Err(e) if !e.is_fatal() => {
                        report.sources.skipped += 1;
                        warn!("skipping {}: {e}", path.display());
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

/// Discards every preview frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPreview;

impl PreviewPresenter for NoPreview {
    fn present(
        &mut self,
        _device: &str,
        _index: usize,
        _frame: &devcal_core::Frame,
        _wait: bool,
    ) -> Result<crate::preview::PreviewControl, crate::preview::PreviewError> {
        Ok(crate::preview::PreviewControl::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devcal_core::DistortionCoefficients;
    use nalgebra::Matrix3;

    fn output(fx: f64, rms: f64) -> SolverOutput {
        SolverOutput {
            camera_matrix: Matrix3::new(fx, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0),
            distortion: DistortionCoefficients::default(),
            reprojection_error: rms,
        }
    }

    #[test]
    fn sources_are_sorted_and_filtered() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.png", "a.mov", ".hidden.png", "c.txt"] {
            fs::write(dir.path().join(name), b"x").expect("write");
        }
        fs::create_dir(dir.path().join("nested")).expect("mkdir");

        let names: Vec<_> = list_sources(dir.path())
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["a.mov", "b.png", "c.txt"]);
    }

    #[test]
    fn missing_directory_is_a_source_access_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = list_sources(&dir.path().join("absent")).expect_err("missing");
        assert!(matches!(err, CalibrationError::SourceAccess { .. }));
    }

    #[test]
    fn invalid_solutions_are_rejected() {
        assert!(validate_solution(&output(500.0, 0.2)).is_ok());
        for bad in [output(-1.0, 0.2), output(f64::NAN, 0.2), output(500.0, f64::INFINITY)] {
            assert!(matches!(
                validate_solution(&bad),
                Err(CalibrationError::DegenerateSolution(_))
            ));
        }
    }
}
