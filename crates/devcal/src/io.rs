//! JSON persistence of calibration results.

use devcal_core::CalibrationResult;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum ResultIoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Persists one device's result.
pub trait ResultWriter {
    /// Store `result` under `device`; returns where it went.
    fn write(&self, device: &str, result: &CalibrationResult) -> Result<PathBuf, ResultIoError>;
}

/// Writes `<dir>/<device>.json` as pretty JSON, creating `dir` on demand.
#[derive(Clone, Debug)]
pub struct JsonResultWriter {
    dir: PathBuf,
}

impl JsonResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, device: &str) -> PathBuf {
        self.dir.join(format!("{device}.json"))
    }
}

impl ResultWriter for JsonResultWriter {
    fn write(&self, device: &str, result: &CalibrationResult) -> Result<PathBuf, ResultIoError> {
        fs::create_dir_all(&self.dir).map_err(|source| ResultIoError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(device);
        write_result(&path, result)?;
        Ok(path)
    }
}

/// Write a result as pretty JSON.
pub fn write_result(path: impl AsRef<Path>, result: &CalibrationResult) -> Result<(), ResultIoError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|source| ResultIoError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a result written by [`write_result`].
pub fn read_result(path: impl AsRef<Path>) -> Result<CalibrationResult, ResultIoError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ResultIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}
