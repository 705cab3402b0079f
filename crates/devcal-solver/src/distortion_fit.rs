//! Linear distortion estimate from homography residuals.
//!
//! For every board point the homography predicts an ideal (undistorted)
//! pixel. Both the prediction and the observation are mapped to normalized
//! coordinates with `K^-1`; their difference is linear in `k1, k2, [k3]` and
//! `[p1, p2]` to first order and is solved in the least-squares sense.

use crate::homography::apply;
use devcal_core::DistortionCoefficients;
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Vector2, Vector3};

/// Which coefficients the fit is allowed to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistortionFitOptions {
    /// Keep `p1 = p2 = 0`.
    pub fix_tangential: bool,
    /// Keep `k3 = 0`.
    pub fix_k3: bool,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
        }
    }
}

impl DistortionFitOptions {
    fn param_count(&self) -> usize {
        2 + usize::from(!self.fix_k3) + 2 * usize::from(!self.fix_tangential)
    }
}

/// One view for the fit: `homography` maps board coordinates to ideal pixels,
/// `pixels` are the raw (distorted) detections.
#[derive(Debug, Clone)]
pub struct DistortionView<'a> {
    pub homography: Matrix3<f64>,
    pub board: &'a [Point2<f64>],
    pub pixels: &'a [Point2<f64>],
}

fn to_normalized(k_inv: &Matrix3<f64>, p: &Point2<f64>) -> Vector2<f64> {
    let v = k_inv * Vector3::new(p.x, p.y, 1.0);
    Vector2::new(v.x / v.z, v.y / v.z)
}

/// Fit distortion coefficients for the given intrinsics.
///
/// Returns `None` when `K` is singular, there are too few points, the points
/// have no radial spread, or the least-squares solve fails.
pub fn estimate_distortion(
    kmtx: &Matrix3<f64>,
    views: &[DistortionView<'_>],
    opts: DistortionFitOptions,
) -> Option<DistortionCoefficients> {
    let total: usize = views.iter().map(|v| v.board.len().min(v.pixels.len())).sum();
    let n_params = opts.param_count();
    if total < n_params + 2 {
        return None;
    }

    let k_inv = kmtx.try_inverse()?;

    let mut a = DMatrix::<f64>::zeros(2 * total, n_params);
    let mut b = DVector::<f64>::zeros(2 * total);
    let mut max_r2 = 0.0_f64;

    let mut row = 0;
    for view in views {
        for (board, pixel) in view.board.iter().zip(view.pixels) {
            let ideal = to_normalized(&k_inv, &apply(&view.homography, board));
            let observed = to_normalized(&k_inv, pixel);
            let residual = observed - ideal;

            let (x, y) = (ideal.x, ideal.y);
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            max_r2 = max_r2.max(r2);

            let mut col = 0;
            a[(row, col)] = x * r2;
            a[(row + 1, col)] = y * r2;
            col += 1;

            a[(row, col)] = x * r4;
            a[(row + 1, col)] = y * r4;
            col += 1;

            if !opts.fix_k3 {
                let r6 = r4 * r2;
                a[(row, col)] = x * r6;
                a[(row + 1, col)] = y * r6;
                col += 1;
            }

            if !opts.fix_tangential {
                let xy = x * y;
                // p1
                a[(row, col)] = 2.0 * xy;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                col += 1;
                // p2
                a[(row, col)] = r2 + 2.0 * x * x;
                a[(row + 1, col)] = 2.0 * xy;
            }

            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    if max_r2 < 1e-6 {
        return None;
    }

    let x = a.svd(true, true).solve(&b, 1e-12).ok()?;

    let mut it = x.iter().copied();
    let k1 = it.next()?;
    let k2 = it.next()?;
    let k3 = if opts.fix_k3 { 0.0 } else { it.next()? };
    let (p1, p2) = if opts.fix_tangential {
        (0.0, 0.0)
    } else {
        (it.next()?, it.next()?)
    };

    let dist = DistortionCoefficients {
        k1,
        k2,
        p1,
        p2,
        k3,
        ..Default::default()
    };
    dist.all_finite().then_some(dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0)
    }

    fn board() -> Vec<Point2<f64>> {
        (0..9)
            .flat_map(|j| (0..13).map(move |i| Point2::new(i as f64 * 0.04, j as f64 * 0.04)))
            .collect()
    }

    // Fronto-parallel board at distance 1, centred on the optical axis.
    fn homography(k: &Matrix3<f64>) -> Matrix3<f64> {
        let pose = Matrix3::new(1.0, 0.0, -0.24, 0.0, 1.0, -0.16, 0.0, 0.0, 1.0);
        k * pose
    }

    fn distorted_pixels(
        k: &Matrix3<f64>,
        h: &Matrix3<f64>,
        board: &[Point2<f64>],
        d: &DistortionCoefficients,
    ) -> Vec<Point2<f64>> {
        let k_inv = k.try_inverse().expect("invertible");
        board
            .iter()
            .map(|p| {
                let n = to_normalized(&k_inv, &apply(h, p));
                let nd = d.distort(&n);
                let v = k * Vector3::new(nd.x, nd.y, 1.0);
                Point2::new(v.x, v.y)
            })
            .collect()
    }

    #[test]
    fn recovers_radial_and_tangential_terms() {
        let k = kmtx();
        let h = homography(&k);
        let board = board();
        let gt = DistortionCoefficients {
            k1: -0.08,
            k2: 0.01,
            p1: 0.002,
            p2: -0.001,
            ..Default::default()
        };
        let pixels = distorted_pixels(&k, &h, &board, &gt);
        let views = [DistortionView {
            homography: h,
            board: &board,
            pixels: &pixels,
        }];
        let est = estimate_distortion(&k, &views, DistortionFitOptions::default()).expect("fit");
        assert_relative_eq!(est.k1, gt.k1, epsilon = 1e-6);
        assert_relative_eq!(est.k2, gt.k2, epsilon = 1e-5);
        assert_relative_eq!(est.p1, gt.p1, epsilon = 1e-6);
        assert_relative_eq!(est.p2, gt.p2, epsilon = 1e-6);
        assert_eq!(est.k3, 0.0);
    }

    #[test]
    fn fixed_tangential_stays_zero() {
        let k = kmtx();
        let h = homography(&k);
        let board = board();
        let gt = DistortionCoefficients {
            k1: -0.05,
            ..Default::default()
        };
        let pixels = distorted_pixels(&k, &h, &board, &gt);
        let views = [DistortionView {
            homography: h,
            board: &board,
            pixels: &pixels,
        }];
        let opts = DistortionFitOptions {
            fix_tangential: true,
            fix_k3: true,
        };
        let est = estimate_distortion(&k, &views, opts).expect("fit");
        assert_eq!(est.p1, 0.0);
        assert_eq!(est.p2, 0.0);
        assert_relative_eq!(est.k1, gt.k1, epsilon = 1e-6);
    }

    #[test]
    fn points_at_the_centre_are_degenerate() {
        let k = kmtx();
        let h = k;
        let board = vec![Point2::new(0.0, 0.0); 10];
        let pixels = vec![Point2::new(320.0, 240.0); 10];
        let views = [DistortionView {
            homography: h,
            board: &board,
            pixels: &pixels,
        }];
        assert!(estimate_distortion(&k, &views, DistortionFitOptions::default()).is_none());
    }
}
