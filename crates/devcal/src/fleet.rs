//! Fleet-level orchestration: one device directory after another, stopping
//! at the first device that fails.

use crate::device::{access_error, Collaborators, DeviceCalibrationRun, DeviceFailure, DeviceReport};
use crate::preview::PreviewPresenter;
use crate::{CalibrationError, PipelineConfig};
use devcal_media::is_hidden;
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Overall status of a run. Once failed it stays failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunStatus {
    #[default]
    Success,
    Failed,
}

impl RunStatus {
    pub fn record(&mut self, ok: bool) {
        if !ok {
            *self = RunStatus::Failed;
        }
    }

    pub fn is_success(&self) -> bool {
        *self == RunStatus::Success
    }
}

/// Device subdirectories of `data_dir`, sorted by name.
///
/// With `only` set, just that device, which must exist.
pub fn discover_devices(
    data_dir: &Path,
    only: Option<&str>,
) -> Result<Vec<(String, PathBuf)>, CalibrationError> {
    if let Some(name) = only {
        let dir = data_dir.join(name);
        let meta = fs::metadata(&dir).map_err(|e| access_error(&dir, e))?;
        if !meta.is_dir() {
            return Err(access_error(
                &dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        return Ok(vec![(name.to_string(), dir)]);
    }

    let mut devices = Vec::new();
    for entry in fs::read_dir(data_dir).map_err(|e| access_error(data_dir, e))? {
        let entry = entry.map_err(|e| access_error(data_dir, e))?;
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let meta = fs::metadata(&path).map_err(|e| access_error(&path, e))?;
        if !meta.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        devices.push((name, path));
    }
    devices.sort();
    Ok(devices)
}

/// Result of a whole fleet run.
#[derive(Debug, Default)]
pub struct FleetReport {
    /// One entry per attempted device, in processing order.
    pub outcomes: Vec<Result<DeviceReport, DeviceFailure>>,
    pub status: RunStatus,
    /// Devices left untouched after a failure.
    pub not_attempted: Vec<String>,
}

impl FleetReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DeviceReport> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failure(&self) -> Option<&DeviceFailure> {
        self.outcomes.iter().find_map(|o| o.as_ref().err())
    }
}

pub struct FleetOrchestrator<'a> {
    config: &'a PipelineConfig,
    tools: Collaborators<'a>,
}

impl<'a> FleetOrchestrator<'a> {
    pub fn new(config: &'a PipelineConfig, tools: Collaborators<'a>) -> Self {
        Self { config, tools }
    }

    /// Calibrate every device under the data directory.
    ///
    /// Errs only when the device list cannot be built. Device failures end
    /// up in [`FleetReport::outcomes`] and flip the status.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(data_dir = %self.config.data_dir.display())))]
    pub fn run(
        &self,
        presenter: &mut dyn PreviewPresenter,
    ) -> Result<FleetReport, CalibrationError> {
        let devices = discover_devices(&self.config.data_dir, self.config.device.as_deref())?;
        if devices.is_empty() {
            warn!("no device directories under {}", self.config.data_dir.display());
        } else {
            info!("{} device(s) to calibrate", devices.len());
        }

        let run = DeviceCalibrationRun::new(self.config, self.tools);
        let mut report = FleetReport::default();
        let mut pending = devices.into_iter();
        for (name, dir) in pending.by_ref() {
            let outcome = run.run(&name, &dir, presenter);
            report.status.record(outcome.is_ok());
            report.outcomes.push(outcome);
            if !report.status.is_success() {
                break;
            }
        }
        report.not_attempted = pending.map(|(name, _)| name).collect();

        if report.status.is_success() {
            info!("all {} device(s) calibrated", report.outcomes.len());
        } else {
            error!(
                "stopped after a failed device, {} device(s) not attempted",
                report.not_attempted.len()
            );
        }
        Ok(report)
    }
}
