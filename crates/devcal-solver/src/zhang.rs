//! Closed-form intrinsics from plane homographies (Zhang), with zero skew and
//! the optional fixed-principal-point / fixed-aspect-ratio constraints.
//!
//! The image of the absolute conic `B = K^-T K^-1` is written as the 6-vector
//! `b = [B11, B12, B22, B13, B23, B33]`. Each homography contributes two
//! linear constraints on `b`. Constraints are imposed by solving for a reduced
//! unknown vector `x` with `b = P x`.

use devcal_core::{CalibrationFlags, FrameDimensions, SolverError};
use nalgebra::{DMatrix, Matrix3, SVector};

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Basis `P` (6 x m) mapping the reduced unknowns onto `b`. `B12` is always
/// zero (no skew).
fn constraint_basis(flags: CalibrationFlags) -> DMatrix<f64> {
    // (row of b, column of x) pairs set to one.
    let entries: &[(usize, usize)] = match (flags.fix_principal_point, flags.fix_aspect_ratio) {
        // x = [B11, B22, B13, B23, B33]
        (false, false) => &[(0, 0), (2, 1), (3, 2), (4, 3), (5, 4)],
        // x = [B11 = B22, B13, B23, B33]
        (false, true) => &[(0, 0), (2, 0), (3, 1), (4, 2), (5, 3)],
        // x = [B11, B22, B33]
        (true, false) => &[(0, 0), (2, 1), (5, 2)],
        // x = [B11 = B22, B33]
        (true, true) => &[(0, 0), (2, 0), (5, 1)],
    };
    let cols = entries.iter().map(|&(_, c)| c).max().unwrap_or(0) + 1;
    let mut p = DMatrix::<f64>::zeros(6, cols);
    for &(r, c) in entries {
        p[(r, c)] = 1.0;
    }
    p
}

/// Minimum number of views for the constrained system to be determined.
pub fn min_views(flags: CalibrationFlags) -> usize {
    let unknowns = constraint_basis(flags).ncols();
    (unknowns - 1).div_ceil(2).max(1)
}

/// Pixel normalization: centre on the image and scale by its larger side.
fn image_normalization(size: FrameDimensions) -> (Matrix3<f64>, f64) {
    let s = f64::from(size.width.max(size.height)).max(1.0);
    let c = size.center();
    let n = Matrix3::new(
        1.0 / s,
        0.0,
        -c.x / s,
        0.0,
        1.0 / s,
        -c.y / s,
        0.0,
        0.0,
        1.0,
    );
    (n, s)
}

/// Estimate the camera matrix from board-to-image homographies.
///
/// With `fix_principal_point` the principal point is the image centre; with
/// `fix_aspect_ratio` the result has `fx == fy`.
pub fn intrinsics_from_homographies(
    homographies: &[Matrix3<f64>],
    image_size: FrameDimensions,
    flags: CalibrationFlags,
) -> Result<Matrix3<f64>, SolverError> {
    let required = min_views(flags);
    if homographies.len() < required {
        return Err(SolverError::NotEnoughViews {
            got: homographies.len(),
            required,
        });
    }

    let (norm, scale) = image_normalization(image_size);
    let basis = constraint_basis(flags);
    let m = basis.ncols();

    let rows = (2 * homographies.len()).max(m);
    let mut vmtx = DMatrix::<f64>::zeros(rows, 6);
    for (k, h) in homographies.iter().enumerate() {
        let mut hn = norm * h;
        let fro = hn.norm();
        if fro > 0.0 {
            hn /= fro;
        }
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let reduced = vmtx * &basis;
    let svd = reduced.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| SolverError::Degenerate("svd did not converge".into()))?;
    let x = v_t.row(v_t.nrows() - 1).transpose();
    let mut b = &basis * x;
    if b[0] < 0.0 {
        b = -b;
    }

    let (b11, b22, b13, b23, b33) = (b[0], b[2], b[3], b[4], b[5]);
    if b11 <= f64::EPSILON || b22 <= f64::EPSILON {
        return Err(SolverError::Degenerate(
            "conic is not positive definite; add views with more tilt".into(),
        ));
    }

    // Zhang's closed form with B12 = 0.
    let v0 = -b23 / b22;
    let lambda = b33 - (b13 * b13 - v0 * b11 * b23) / b11;
    if lambda <= 0.0 || !lambda.is_finite() {
        return Err(SolverError::Degenerate(format!(
            "invalid conic scale (lambda = {lambda})"
        )));
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda / b22).sqrt();
    let u0 = -b13 * alpha * alpha / lambda;

    let c = image_size.center();
    let kmtx = Matrix3::new(
        scale * alpha,
        0.0,
        scale * u0 + c.x,
        0.0,
        scale * beta,
        scale * v0 + c.y,
        0.0,
        0.0,
        1.0,
    );
    if !kmtx.iter().all(|v| v.is_finite()) {
        return Err(SolverError::Degenerate("non-finite intrinsics".into()));
    }
    Ok(kmtx)
}
