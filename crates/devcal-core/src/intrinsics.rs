use crate::FrameDimensions;
use nalgebra::{Matrix3, Vector2};
use serde::{Deserialize, Serialize};

/// Distortion coefficients in the 8-term rational Brown-Conrady layout
/// `[k1, k2, p1, p2, k3, k4, k5, k6]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DistortionCoefficients {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl DistortionCoefficients {
    pub fn from_array(c: [f64; 8]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
            k4: c[5],
            k5: c[6],
            k6: c[7],
        }
    }

    pub fn to_array(&self) -> [f64; 8] {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
    }

    /// Apply the distortion model to a normalized, undistorted point.
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        let radial = num / den;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, n_dist: &Vector2<f64>, iters: u32) -> Vector2<f64> {
        let mut n = *n_dist;
        for _ in 0..iters.max(1) {
            let e = self.distort(&n) - n_dist;
            n -= e;
        }
        n
    }

    pub fn all_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

/// Pinhole intrinsics plus distortion as returned by a solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverOutput {
    pub camera_matrix: Matrix3<f64>,
    pub distortion: DistortionCoefficients,
    /// RMS reprojection error over all points, in pixels.
    pub reprojection_error: f64,
}

impl SolverOutput {
    #[inline]
    pub fn fx(&self) -> f64 {
        self.camera_matrix[(0, 0)]
    }

    #[inline]
    pub fn fy(&self) -> f64 {
        self.camera_matrix[(1, 1)]
    }

    #[inline]
    pub fn cx(&self) -> f64 {
        self.camera_matrix[(0, 2)]
    }

    #[inline]
    pub fn cy(&self) -> f64 {
        self.camera_matrix[(1, 2)]
    }
}

/// Persisted calibration of one device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Row-major 3x3 camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3, k4, k5, k6]`.
    pub distortion_coefficients: [f64; 8],
    pub reprojection_error: f64,
    pub image_size: FrameDimensions,
    pub views: usize,
}

impl CalibrationResult {
    pub fn from_solver(out: &SolverOutput, image_size: FrameDimensions, views: usize) -> Self {
        let k = &out.camera_matrix;
        Self {
            camera_matrix: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            distortion_coefficients: out.distortion.to_array(),
            reprojection_error: out.reprojection_error,
            image_size,
            views,
        }
    }

    pub fn camera_matrix(&self) -> Matrix3<f64> {
        let m = &self.camera_matrix;
        Matrix3::new(
            m[0][0], m[0][1], m[0][2], //
            m[1][0], m[1][1], m[1][2], //
            m[2][0], m[2][1], m[2][2],
        )
    }

    pub fn distortion(&self) -> DistortionCoefficients {
        DistortionCoefficients::from_array(self.distortion_coefficients)
    }
}
