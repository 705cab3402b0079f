use crate::distortion_fit::{estimate_distortion, DistortionFitOptions, DistortionView};
use crate::homography::estimate_homography;
use crate::lm::LmOptions;
use crate::pose::pose_from_homography;
use crate::refine::{project, refine_camera, ParamLayout};
use crate::zhang::intrinsics_from_homographies;
use devcal_core::{
    CalibrationFlags, DistortionCoefficients, FrameDimensions, IntrinsicsSolver, Observation,
    SolverError, SolverOutput,
};
use log::{debug, warn};
use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tuning knobs for [`PlanarIntrinsicsSolver`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarSolverOptions {
    /// Alternating distortion / camera matrix refinements after the
    /// distortion-free initial estimate.
    pub refine_iterations: usize,
    /// Also estimate the sixth-order radial term `k3`.
    pub estimate_k3: bool,
    /// Fixed-point iterations when undistorting observations.
    pub undistort_iterations: u32,
    /// Cap on Levenberg-Marquardt iterations of the joint reprojection
    /// refinement; zero keeps the linear estimate.
    pub lm_iterations: usize,
}

impl Default for PlanarSolverOptions {
    fn default() -> Self {
        Self {
            refine_iterations: 2,
            estimate_k3: false,
            undistort_iterations: 10,
            lm_iterations: 100,
        }
    }
}

/// Planar-target calibration: closed-form intrinsics from plane
/// homographies, alternated with a linear distortion fit, then polished by
/// minimizing the reprojection error over all parameters.
#[derive(Clone, Debug, Default)]
pub struct PlanarIntrinsicsSolver {
    pub options: PlanarSolverOptions,
}

struct PlanarViews {
    board: Vec<Vec<Point2<f64>>>,
    pixels: Vec<Vec<Point2<f64>>>,
}

fn collect_views(
    object_points: &[Vec<Point3<f64>>],
    image_points: &[Observation],
) -> Result<PlanarViews, SolverError> {
    if object_points.is_empty() || object_points.len() != image_points.len() {
        return Err(SolverError::NotEnoughViews {
            got: object_points.len().min(image_points.len()),
            required: 1,
        });
    }

    let mut board = Vec::with_capacity(object_points.len());
    let mut pixels = Vec::with_capacity(object_points.len());
    for (view, (obj, img)) in object_points.iter().zip(image_points).enumerate() {
        if obj.len() != img.len() {
            return Err(SolverError::MismatchedView {
                view,
                object: obj.len(),
                image: img.len(),
            });
        }
        if obj.len() < 4 {
            return Err(SolverError::Degenerate(format!(
                "view {view} has {} points, need at least 4",
                obj.len()
            )));
        }
        if obj.iter().any(|p| p.z.abs() > 1e-9) {
            return Err(SolverError::NonPlanarTarget { view });
        }
        board.push(obj.iter().map(|p| Point2::new(p.x, p.y)).collect());
        pixels.push(
            img.points
                .iter()
                .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
                .collect(),
        );
    }
    Ok(PlanarViews { board, pixels })
}

fn homographies(
    board: &[Vec<Point2<f64>>],
    pixels: &[Vec<Point2<f64>>],
) -> Result<Vec<Matrix3<f64>>, SolverError> {
    board
        .iter()
        .zip(pixels)
        .enumerate()
        .map(|(view, (b, p))| {
            estimate_homography(b, p).ok_or_else(|| {
                SolverError::Degenerate(format!("view {view}: homography estimation failed"))
            })
        })
        .collect()
}

fn undistort_pixels(
    kmtx: &Matrix3<f64>,
    dist: &DistortionCoefficients,
    pixels: &[Vec<Point2<f64>>],
    iters: u32,
) -> Result<Vec<Vec<Point2<f64>>>, SolverError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or_else(|| SolverError::Degenerate("camera matrix is singular".into()))?;
    Ok(pixels
        .iter()
        .map(|view| {
            view.iter()
                .map(|p| {
                    let v = k_inv * Vector3::new(p.x, p.y, 1.0);
                    let n = dist.undistort(&Vector2::new(v.x / v.z, v.y / v.z), iters);
                    let q = kmtx * Vector3::new(n.x, n.y, 1.0);
                    Point2::new(q.x / q.z, q.y / q.z)
                })
                .collect()
        })
        .collect())
}

/// Per-view poses from the homographies of the undistorted observations,
/// and the RMS reprojection error through them.
fn poses_and_rms(
    kmtx: &Matrix3<f64>,
    dist: &DistortionCoefficients,
    views: &PlanarViews,
    undistort_iterations: u32,
) -> Result<(Vec<Isometry3<f64>>, f64), SolverError> {
    let undistorted = undistort_pixels(kmtx, dist, &views.pixels, undistort_iterations)?;
    let hs = homographies(&views.board, &undistorted)?;
    let mut poses = Vec::with_capacity(hs.len());
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for (view, h) in hs.iter().enumerate() {
        let pose = pose_from_homography(kmtx, h).ok_or_else(|| {
            SolverError::Degenerate(format!("view {view}: pose recovery failed"))
        })?;
        for (b, p) in views.board[view].iter().zip(&views.pixels[view]) {
            let q = project(kmtx, dist, &pose, b).ok_or_else(|| {
                SolverError::Degenerate(format!("view {view}: target point behind the camera"))
            })?;
            sum_sq += (q.x - p.x).powi(2) + (q.y - p.y).powi(2);
            count += 1;
        }
        poses.push(pose);
    }
    Ok((poses, (sum_sq / count.max(1) as f64).sqrt()))
}

impl IntrinsicsSolver for PlanarIntrinsicsSolver {
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, object_points, image_points),
            fields(views = image_points.len(), size = %image_size)
        )
    )]
    fn calibrate(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Observation],
        image_size: FrameDimensions,
        flags: CalibrationFlags,
    ) -> Result<SolverOutput, SolverError> {
        if image_size.is_empty() {
            return Err(SolverError::Degenerate(format!(
                "empty image size {image_size}"
            )));
        }
        let views = collect_views(object_points, image_points)?;
        let opts = &self.options;
        let fit_opts = DistortionFitOptions {
            fix_tangential: flags.zero_tangential_distortion,
            fix_k3: !opts.estimate_k3,
        };

        let initial =
            intrinsics_from_homographies(&homographies(&views.board, &views.pixels)?, image_size, flags)?;
        let mut kmtx = initial;
        let mut dist = DistortionCoefficients::default();
        debug!(
            "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            kmtx[(0, 0)],
            kmtx[(1, 1)],
            kmtx[(0, 2)],
            kmtx[(1, 2)]
        );

        for iter in 0..opts.refine_iterations {
            let undistorted = undistort_pixels(&kmtx, &dist, &views.pixels, opts.undistort_iterations)?;
            let hs = homographies(&views.board, &undistorted)?;
            let fit_views: Vec<DistortionView<'_>> = hs
                .iter()
                .zip(views.board.iter().zip(&views.pixels))
                .map(|(h, (board, pixels))| DistortionView {
                    homography: *h,
                    board,
                    pixels,
                })
                .collect();

            dist = match estimate_distortion(&kmtx, &fit_views, fit_opts) {
                Some(d) => d,
                None => {
                    warn!("distortion fit degenerate at iteration {iter}, keeping zero distortion");
                    DistortionCoefficients::default()
                }
            };

            let undistorted = undistort_pixels(&kmtx, &dist, &views.pixels, opts.undistort_iterations)?;
            kmtx = intrinsics_from_homographies(
                &homographies(&views.board, &undistorted)?,
                image_size,
                flags,
            )?;
            debug!(
                "iteration {iter}: fx={:.2} fy={:.2} cx={:.2} cy={:.2} k1={:.4} k2={:.4}",
                kmtx[(0, 0)],
                kmtx[(1, 1)],
                kmtx[(0, 2)],
                kmtx[(1, 2)],
                dist.k1,
                dist.k2
            );
        }

        let linear = poses_and_rms(&kmtx, &dist, &views, opts.undistort_iterations);
        let zero = poses_and_rms(
            &initial,
            &DistortionCoefficients::default(),
            &views,
            opts.undistort_iterations,
        );
        // the linear fit can overshoot on strongly distorted views
        let (poses, mut rms) = match (linear, zero) {
            (Ok(lin), Ok(zero)) if zero.1 < lin.1 || !lin.1.is_finite() => {
                debug!(
                    "linear distortion fit rms {:.4} worse than {:.4} without, discarding it",
                    lin.1, zero.1
                );
                kmtx = initial;
                dist = DistortionCoefficients::default();
                zero
            }
            (Ok(lin), _) => lin,
            (Err(_), Ok(zero)) => {
                kmtx = initial;
                dist = DistortionCoefficients::default();
                zero
            }
            (Err(e), Err(_)) => return Err(e),
        };

        if opts.lm_iterations > 0 {
            let layout = ParamLayout {
                flags,
                estimate_k3: opts.estimate_k3,
            };
            let lm_opts = LmOptions {
                max_iters: opts.lm_iterations,
                ..LmOptions::default()
            };
            let refined = refine_camera(
                layout,
                &kmtx,
                &dist,
                &poses,
                &views.board,
                &views.pixels,
                &lm_opts,
            );
            let points: usize = views.board.iter().map(Vec::len).sum();
            let refined_rms = (2.0 * refined.report.final_cost / points.max(1) as f64).sqrt();
            if refined_rms.is_finite()
                && refined.camera_matrix.iter().all(|v| v.is_finite())
                && refined.distortion.all_finite()
            {
                debug!(
                    "refinement: {} iterations (converged: {}), cost {:.3e} -> {:.3e}, rms {rms:.4} -> {refined_rms:.4}",
                    refined.report.iterations,
                    refined.report.converged,
                    refined.report.initial_cost,
                    refined.report.final_cost
                );
                kmtx = refined.camera_matrix;
                dist = refined.distortion;
                rms = refined_rms;
            } else {
                warn!("reprojection refinement diverged, keeping the linear estimate");
            }
        }

        if !rms.is_finite() {
            return Err(SolverError::Degenerate("non-finite reprojection error".into()));
        }

        Ok(SolverOutput {
            camera_matrix: kmtx,
            distortion: dist,
            reprojection_error: rms,
        })
    }
}
