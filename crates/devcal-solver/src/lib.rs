//! Planar-target intrinsics solver.
//!
//! [`PlanarIntrinsicsSolver`] implements [`devcal_core::IntrinsicsSolver`]:
//!
//! 1. per-view homographies (normalized DLT),
//! 2. closed-form camera matrix from the homographies, honouring the
//!    fixed principal point / fixed aspect ratio constraints,
//! 3. alternating linear distortion fits and camera matrix re-estimates on
//!    undistorted observations,
//! 4. Levenberg-Marquardt over intrinsics, distortion and per-view poses,
//!    minimizing the pixel reprojection error; its RMS is reported.
//!
//! [`UndistortMap`] turns a result into a reusable resampling map.

mod distortion_fit;
mod homography;
mod lm;
mod planar;
mod pose;
mod refine;
mod undistort;
mod zhang;

pub use distortion_fit::{estimate_distortion, DistortionFitOptions, DistortionView};
pub use homography::estimate_homography;
pub use planar::{PlanarIntrinsicsSolver, PlanarSolverOptions};
pub use pose::pose_from_homography;
pub use undistort::UndistortMap;
pub use zhang::{intrinsics_from_homographies, min_views};
