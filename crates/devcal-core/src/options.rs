use serde::{Deserialize, Serialize};

/// How accepted frames are shown back to the user once the device is solved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    None,
    /// Keep only the first accepted frame and show it undistorted.
    FirstFrameOnly,
    /// Keep every accepted frame and step through them one by one.
    Interactive,
}

impl DisplayMode {
    /// Whether an accepted frame should be retained for the preview.
    #[inline]
    pub fn retains(&self, is_first_accepted: bool) -> bool {
        match self {
            DisplayMode::None => false,
            DisplayMode::FirstFrameOnly => is_first_accepted,
            DisplayMode::Interactive => true,
        }
    }
}

/// Calibration options fixed for the whole process run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub fix_principal_point: bool,
    pub fix_aspect_ratio: bool,
    pub zero_tangential_distortion: bool,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub display_mode: DisplayMode,
}

impl CalibrationOptions {
    /// Solver-facing subset of the options.
    pub fn solver_flags(&self) -> CalibrationFlags {
        CalibrationFlags {
            fix_principal_point: self.fix_principal_point,
            fix_aspect_ratio: self.fix_aspect_ratio,
            zero_tangential_distortion: self.zero_tangential_distortion,
        }
    }
}

/// Constraints handed to an [`IntrinsicsSolver`](crate::IntrinsicsSolver).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationFlags {
    /// Pin the principal point to the image centre.
    pub fix_principal_point: bool,
    /// Force `fx == fy`.
    pub fix_aspect_ratio: bool,
    /// Force `p1 == p2 == 0`.
    pub zero_tangential_distortion: bool,
}
