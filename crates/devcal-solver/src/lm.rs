//! Dense Levenberg-Marquardt for small non-linear least-squares problems.

use nalgebra::{DMatrix, DVector};

/// A residual function `r(x)`; the Jacobian defaults to central differences.
pub(crate) trait LeastSquaresProblem {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(|p| self.residuals(p), x)
    }
}

/// Central-difference Jacobian with a step relative to each parameter.
pub(crate) fn numeric_jacobian<F>(f: F, x: &DVector<f64>) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let rows = f(x).len();
    let mut jac = DMatrix::zeros(rows, x.len());
    let mut shifted = x.clone();
    for col in 0..x.len() {
        let h = 1e-6 * x[col].abs().max(1.0);
        shifted[col] = x[col] + h;
        let plus = f(&shifted);
        shifted[col] = x[col] - h;
        let minus = f(&shifted);
        shifted[col] = x[col];
        jac.set_column(col, &((plus - minus) / (2.0 * h)));
    }
    jac
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LmOptions {
    pub max_iters: usize,
    /// Relative cost decrease below which the solve stops.
    pub ftol: f64,
    /// Relative step size below which the solve stops.
    pub xtol: f64,
    /// Gradient max-norm below which the solve stops.
    pub gtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LmReport {
    pub iterations: usize,
    pub initial_cost: f64,
    /// Half the squared residual norm at the returned parameters.
    pub final_cost: f64,
    pub converged: bool,
}

fn cost(r: &DVector<f64>) -> f64 {
    0.5 * r.norm_squared()
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e12;

/// Minimize `0.5 * |r(x)|^2` from `x0`. Never returns parameters with a
/// higher cost than `x0`.
pub(crate) fn minimize<P: LeastSquaresProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &LmOptions,
) -> (DVector<f64>, LmReport) {
    let mut x = x0;
    let mut r = problem.residuals(&x);
    let mut current = cost(&r);
    let mut report = LmReport {
        iterations: 0,
        initial_cost: current,
        final_cost: current,
        converged: false,
    };
    if !current.is_finite() {
        return (x, report);
    }

    let mut lambda = 1e-3;
    'outer: while report.iterations < opts.max_iters {
        report.iterations += 1;
        let jac = problem.jacobian(&x);
        let grad = jac.tr_mul(&r);
        if grad.amax() <= opts.gtol {
            report.converged = true;
            break;
        }
        let normal = jac.tr_mul(&jac);

        loop {
            let mut damped = normal.clone();
            for i in 0..damped.nrows() {
                damped[(i, i)] += lambda * normal[(i, i)].max(1e-12);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    break 'outer;
                }
                continue;
            };
            let step = chol.solve(&(-&grad));
            let candidate = &x + &step;
            let r_new = problem.residuals(&candidate);
            let next = cost(&r_new);

            if next.is_finite() && next < current {
                let decrease = current - next;
                let small_step = step.norm() <= opts.xtol * (x.norm() + opts.xtol);
                x = candidate;
                r = r_new;
                current = next;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if decrease <= opts.ftol * current.max(f64::MIN_POSITIVE) || small_step {
                    report.converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // no downhill step left at any damping
                report.converged = true;
                break 'outer;
            }
        }
    }

    report.final_cost = current;
    (x, report)
}
