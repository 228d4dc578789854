//! Nonlinear least squares through the `levenberg-marquardt` crate.
//!
//! Problems are written against the workspace `nalgebra`; the solver runs on
//! the `nalgebra` release that `levenberg-marquardt` is built with, so
//! parameters, residuals and Jacobians are copied across at this boundary.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::{trace, warn};
use nalgebra::{DMatrix, DVector};
use nalgebra_lm::{storage::Owned, Dyn};
use serde::{Deserialize, Serialize};

use crate::error::CalibError;

/// A nonlinear least-squares problem `min ½‖r(x)‖²`.
pub trait NllsProblem {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Defaults to central differences over every parameter.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        numeric_jacobian(x, |p| self.residuals(p))
    }
}

/// Finite-difference step for a parameter of magnitude `v`.
#[inline]
pub(crate) fn diff_step(v: f64) -> f64 {
    1e-6 * v.abs().max(1.0)
}

/// Central-difference Jacobian of `f` at `x`.
pub fn numeric_jacobian<F>(x: &DVector<f64>, f: F) -> DMatrix<f64>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let m = f(x).len();
    let mut jac = DMatrix::zeros(m, x.len());
    let mut xp = x.clone();
    for c in 0..x.len() {
        let h = diff_step(x[c]);
        xp[c] = x[c] + h;
        let fp = f(&xp);
        xp[c] = x[c] - h;
        let fm = f(&xp);
        xp[c] = x[c];
        jac.set_column(c, &((fp - fm) / (2.0 * h)));
    }
    jac
}

/// Solver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmOptions {
    /// Residual evaluations allowed per parameter (plus one).
    pub patience: usize,
    /// Relative cost reduction below which the run has converged.
    pub ftol: f64,
    /// Relative step size below which the run has converged.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns at convergence.
    pub gtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 0.0,
        }
    }
}

/// Outcome of one solve. Costs are `½‖r‖²`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LmReport {
    pub evaluations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    /// Solver termination reason, as reported by the solver.
    pub termination: String,
}

fn to_solver(x: &DVector<f64>) -> nalgebra_lm::DVector<f64> {
    nalgebra_lm::DVector::from_column_slice(x.as_slice())
}

fn from_solver(x: &nalgebra_lm::DVector<f64>) -> DVector<f64> {
    DVector::from_column_slice(x.as_slice())
}

struct LmWrapper<'a, P: ?Sized> {
    problem: &'a P,
    params: nalgebra_lm::DVector<f64>,
}

impl<P: NllsProblem + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &nalgebra_lm::DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> nalgebra_lm::DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<nalgebra_lm::DVector<f64>> {
        let r = self.problem.residuals(&from_solver(&self.params));
        Some(to_solver(&r))
    }

    fn jacobian(&self) -> Option<nalgebra_lm::DMatrix<f64>> {
        let j = self.problem.jacobian(&from_solver(&self.params));
        Some(nalgebra_lm::DMatrix::from_column_slice(
            j.nrows(),
            j.ncols(),
            j.as_slice(),
        ))
    }
}

/// Minimize `problem` from `x0`.
///
/// Fails only when the starting point already yields non-finite residuals;
/// a run that stops without converging is reported in [`LmReport`].
pub fn levenberg_marquardt<P>(
    problem: &P,
    x0: DVector<f64>,
    opts: &LmOptions,
) -> Result<(DVector<f64>, LmReport), CalibError>
where
    P: NllsProblem + ?Sized,
{
    let initial_cost = 0.5 * problem.residuals(&x0).norm_squared();
    if !initial_cost.is_finite() {
        return Err(CalibError::NonFinite);
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.patience.max(1));
    let wrapper = LmWrapper {
        problem,
        params: to_solver(&x0),
    };
    let (wrapper, report) = lm.minimize(wrapper);
    let converged = report.termination.was_successful();
    let termination = format!("{:?}", report.termination);
    if converged {
        trace!(
            "lm: cost {initial_cost:.6e} -> {:.6e} in {} evaluations",
            report.objective_function,
            report.number_of_evaluations
        );
    } else {
        warn!("lm stopped without converging: {termination}");
    }

    Ok((
        from_solver(&wrapper.params),
        LmReport {
            evaluations: report.number_of_evaluations,
            initial_cost,
            final_cost: report.objective_function,
            converged,
            termination,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Rosenbrock;

    impl NllsProblem for Rosenbrock {
        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![1.0 - x[0], 10.0 * (x[1] - x[0] * x[0])])
        }
    }

    /// Exponential fit `y = a * exp(b * t)` with an analytic Jacobian.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl NllsProblem for ExpFit {
        fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_iterator(
                self.t.len(),
                self.t.iter().zip(&self.y).map(|(t, y)| x[0] * (x[1] * t).exp() - y),
            )
        }

        fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_fn(self.t.len(), 2, |i, c| {
                let e = (x[1] * self.t[i]).exp();
                if c == 0 {
                    e
                } else {
                    x[0] * self.t[i] * e
                }
            })
        }
    }

    #[test]
    fn minimizes_rosenbrock() {
        let (x, report) =
            levenberg_marquardt(&Rosenbrock, DVector::from_vec(vec![-1.2, 1.0]), &LmOptions::default())
                .unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-6);
        assert!(report.converged, "{}", report.termination);
        assert!(report.final_cost < report.initial_cost);
    }

    #[test]
    fn numeric_jacobian_matches_analytic() {
        let t: Vec<f64> = (0..8).map(|k| k as f64 * 0.25).collect();
        let y = t.iter().map(|t| 2.0 * (-0.7 * t).exp()).collect();
        let fit = ExpFit { t, y };
        let x = DVector::from_vec(vec![1.5, -0.4]);
        let numeric = numeric_jacobian(&x, |p| fit.residuals(p));
        assert_relative_eq!(numeric, fit.jacobian(&x), epsilon = 1e-6);

        let (sol, _) = levenberg_marquardt(&fit, x, &LmOptions::default()).unwrap();
        assert_relative_eq!(sol[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(sol[1], -0.7, epsilon = 1e-8);
    }

    #[test]
    fn non_finite_start_is_an_error() {
        struct Bad;
        impl NllsProblem for Bad {
            fn residuals(&self, _: &DVector<f64>) -> DVector<f64> {
                DVector::from_element(1, f64::NAN)
            }
        }
        let res = levenberg_marquardt(&Bad, DVector::zeros(1), &LmOptions::default());
        assert_eq!(res.unwrap_err(), CalibError::NonFinite);
    }
}
