//! Joint non-linear refinement of intrinsics, distortion and board poses
//! against the raw pixel observations.
//!
//! Parameter layout: `f` or `fx, fy`; then `cx, cy` unless the principal
//! point is fixed; then `k1, k2`, `k3` when estimated, `p1, p2` unless
//! tangential distortion is zeroed; then per view a scaled rotation axis and
//! a translation.

use crate::lm::{minimize, LeastSquaresProblem, LmOptions, LmReport};
use devcal_core::{CalibrationFlags, DistortionCoefficients};
use nalgebra::{DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, Vector2, Vector3};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ParamLayout {
    pub flags: CalibrationFlags,
    pub estimate_k3: bool,
}

impl ParamLayout {
    fn intrinsic_count(&self) -> usize {
        let focal = if self.flags.fix_aspect_ratio { 1 } else { 2 };
        let center = if self.flags.fix_principal_point { 0 } else { 2 };
        let tangential = if self.flags.zero_tangential_distortion { 0 } else { 2 };
        focal + center + 2 + usize::from(self.estimate_k3) + tangential
    }

    fn pack(
        &self,
        kmtx: &Matrix3<f64>,
        dist: &DistortionCoefficients,
        poses: &[Isometry3<f64>],
    ) -> DVector<f64> {
        let mut x = Vec::with_capacity(self.intrinsic_count() + 6 * poses.len());
        if self.flags.fix_aspect_ratio {
            x.push(kmtx[(0, 0)]);
        } else {
            x.extend([kmtx[(0, 0)], kmtx[(1, 1)]]);
        }
        if !self.flags.fix_principal_point {
            x.extend([kmtx[(0, 2)], kmtx[(1, 2)]]);
        }
        x.extend([dist.k1, dist.k2]);
        if self.estimate_k3 {
            x.push(dist.k3);
        }
        if !self.flags.zero_tangential_distortion {
            x.extend([dist.p1, dist.p2]);
        }
        for pose in poses {
            let axis = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            x.extend([axis.x, axis.y, axis.z, t.x, t.y, t.z]);
        }
        DVector::from_vec(x)
    }

    /// Intrinsics and distortion from `x`; fixed entries come from `base`.
    fn unpack_camera(
        &self,
        x: &DVector<f64>,
        base: &Matrix3<f64>,
        base_dist: &DistortionCoefficients,
    ) -> (Matrix3<f64>, DistortionCoefficients) {
        let mut i = 0;
        let mut next = || {
            let v = x[i];
            i += 1;
            v
        };
        let (fx, fy) = if self.flags.fix_aspect_ratio {
            let f = next();
            (f, f)
        } else {
            (next(), next())
        };
        let (cx, cy) = if self.flags.fix_principal_point {
            (base[(0, 2)], base[(1, 2)])
        } else {
            (next(), next())
        };
        let mut dist = *base_dist;
        dist.k1 = next();
        dist.k2 = next();
        if self.estimate_k3 {
            dist.k3 = next();
        }
        if !self.flags.zero_tangential_distortion {
            dist.p1 = next();
            dist.p2 = next();
        }
        let kmtx = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        (kmtx, dist)
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Isometry3<f64> {
        let o = self.intrinsic_count() + 6 * view;
        let rot = Rotation3::new(Vector3::new(x[o], x[o + 1], x[o + 2]));
        Isometry3::from_parts(
            Translation3::new(x[o + 3], x[o + 4], x[o + 5]),
            rot.into(),
        )
    }
}

/// Project a board point through pose, distortion and intrinsics. `None`
/// when the point is not in front of the camera.
pub(crate) fn project(
    kmtx: &Matrix3<f64>,
    dist: &DistortionCoefficients,
    pose: &Isometry3<f64>,
    board: &Point2<f64>,
) -> Option<Point2<f64>> {
    let pc = pose.transform_point(&Point3::new(board.x, board.y, 0.0));
    if pc.z <= f64::EPSILON {
        return None;
    }
    let nd = dist.distort(&Vector2::new(pc.x / pc.z, pc.y / pc.z));
    let q = kmtx * Vector3::new(nd.x, nd.y, 1.0);
    Some(Point2::new(q.x, q.y))
}

struct Reprojection<'a> {
    layout: ParamLayout,
    base: Matrix3<f64>,
    base_dist: DistortionCoefficients,
    board: &'a [Vec<Point2<f64>>],
    pixels: &'a [Vec<Point2<f64>>],
}

impl LeastSquaresProblem for Reprojection<'_> {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let (kmtx, dist) = self.layout.unpack_camera(x, &self.base, &self.base_dist);
        let n: usize = self.board.iter().map(Vec::len).sum();
        let mut r = DVector::zeros(2 * n);
        let mut row = 0;
        for (view, (board, pixels)) in self.board.iter().zip(self.pixels).enumerate() {
            let pose = self.layout.pose(x, view);
            for (b, p) in board.iter().zip(pixels) {
                let (dx, dy) = match project(&kmtx, &dist, &pose, b) {
                    Some(q) => (q.x - p.x, q.y - p.y),
                    None => (f64::NAN, f64::NAN),
                };
                r[row] = dx;
                r[row + 1] = dy;
                row += 2;
            }
        }
        r
    }
}

/// Refined camera plus the LM report.
pub(crate) struct Refined {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: DistortionCoefficients,
    pub report: LmReport,
}

pub(crate) fn refine_camera(
    layout: ParamLayout,
    kmtx: &Matrix3<f64>,
    dist: &DistortionCoefficients,
    poses: &[Isometry3<f64>],
    board: &[Vec<Point2<f64>>],
    pixels: &[Vec<Point2<f64>>],
    opts: &LmOptions,
) -> Refined {
    let problem = Reprojection {
        layout,
        base: *kmtx,
        base_dist: *dist,
        board,
        pixels,
    };
    let (x, report) = minimize(&problem, layout.pack(kmtx, dist, poses), opts);
    let (camera_matrix, distortion) = layout.unpack_camera(&x, kmtx, dist);
    Refined {
        camera_matrix,
        distortion,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(fix_all: bool) -> ParamLayout {
        ParamLayout {
            flags: CalibrationFlags {
                fix_principal_point: fix_all,
                fix_aspect_ratio: fix_all,
                zero_tangential_distortion: fix_all,
            },
            estimate_k3: !fix_all,
        }
    }

    #[test]
    fn pack_unpack_keeps_free_parameters() {
        let kmtx = Matrix3::new(810.0, 0.0, 322.0, 0.0, 790.0, 241.0, 0.0, 0.0, 1.0);
        let dist = DistortionCoefficients {
            k1: -0.2,
            k2: 0.05,
            p1: 0.001,
            p2: -0.002,
            k3: 0.01,
            ..Default::default()
        };
        let pose = Isometry3::from_parts(
            Translation3::new(0.1, -0.2, 0.7),
            Rotation3::from_euler_angles(0.1, 0.2, -0.3).into(),
        );

        let free = layout(false);
        let x = free.pack(&kmtx, &dist, &[pose]);
        assert_eq!(x.len(), 9 + 6);
        let (k2, d2) = free.unpack_camera(&x, &Matrix3::identity(), &Default::default());
        assert_eq!(k2, kmtx);
        assert_eq!(d2, dist);
        let back = free.pose(&x, 0);
        assert!((back.to_homogeneous() - pose.to_homogeneous()).norm() < 1e-12);

        let fixed = layout(true);
        let x = fixed.pack(&kmtx, &dist, &[pose]);
        assert_eq!(x.len(), 3 + 6);
        let (k3, d3) = fixed.unpack_camera(&x, &kmtx, &DistortionCoefficients::default());
        assert_eq!(k3[(0, 0)], k3[(1, 1)]);
        assert_eq!((k3[(0, 2)], k3[(1, 2)]), (322.0, 241.0));
        assert_eq!((d3.p1, d3.p2, d3.k3), (0.0, 0.0, 0.0));
    }

    #[test]
    fn points_behind_the_camera_do_not_project() {
        let pose = Isometry3::translation(0.0, 0.0, -1.0);
        let q = project(
            &Matrix3::identity(),
            &DistortionCoefficients::default(),
            &pose,
            &Point2::new(0.0, 0.0),
        );
        assert!(q.is_none());
    }
}
