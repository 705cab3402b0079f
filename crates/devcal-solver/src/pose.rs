use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Decompose a plane-induced homography (board `Z = 0` to pixels) into the
/// board pose in the camera frame.
///
/// The sign of `H` is chosen so the board lies in front of the camera.
pub fn pose_from_homography(kmtx: &Matrix3<f64>, hmtx: &Matrix3<f64>) -> Option<Isometry3<f64>> {
    let k_inv = kmtx.try_inverse()?;

    let a1 = k_inv * hmtx.column(0);
    let a2 = k_inv * hmtx.column(1);
    let a3 = k_inv * hmtx.column(2);

    let mean_norm = 0.5 * (a1.norm() + a2.norm());
    if mean_norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / mean_norm;
    if a3.z < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = a1 * lambda;
    let r2: Vector3<f64> = a2 * lambda;
    let r3 = r1.cross(&r2);

    let mut r = Matrix3::<f64>::zeros();
    r.set_column(0, &r1);
    r.set_column(1, &r2);
    r.set_column(2, &r3);

    // nearest rotation (polar decomposition)
    let svd = r.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    let t = Translation3::from(a3 * lambda);
    Some(Isometry3::from_parts(t, rot))
}
