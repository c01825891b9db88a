//! Levenberg-Marquardt refinement for [`Parameterized`] estimators.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, trace};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use super::{ModelRefiner, Parameterized, Refinement, RefinementMode};
use crate::error::RefinementError;
use crate::types::{Correspondences, Covariance};

/// Finite-difference scheme for the Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Differences {
    Forward,
    Central,
}

/// Least-squares problem over the inlier residual components.
struct InlierProblem<'p, E: Parameterized> {
    estimator: &'p E,
    data: Correspondences<'p, E::Input, E::Output>,
    inliers: &'p [usize],
    params: DVector<f64>,
    differences: Differences,
}

impl<E: Parameterized> InlierProblem<'_, E> {
    fn residuals_at(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let model = self.estimator.from_params(params)?;
        let dim = self.estimator.residual_dimension();
        let mut r = DVector::zeros(self.inliers.len() * dim);
        for (k, &idx) in self.inliers.iter().enumerate() {
            let out = &mut r.as_mut_slice()[k * dim..(k + 1) * dim];
            self.estimator
                .residual_components(&model, self.data.input(idx), self.data.output(idx), out);
        }
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn step(&self, x: f64) -> f64 {
        let base = match self.differences {
            Differences::Forward => f64::EPSILON.sqrt(),
            Differences::Central => f64::EPSILON.cbrt(),
        };
        base * x.abs().max(1.0)
    }
}

impl<E: Parameterized> LeastSquaresProblem<f64, Dyn, Dyn> for InlierProblem<'_, E> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.params)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let base = match self.differences {
            Differences::Forward => Some(self.residuals_at(&self.params)?),
            Differences::Central => None,
        };
        let p = self.params.len();
        let mut jac = DMatrix::zeros(self.inliers.len() * self.estimator.residual_dimension(), p);
        let mut x = self.params.clone();
        for j in 0..p {
            let h = self.step(self.params[j]);
            x[j] = self.params[j] + h;
            let plus = self.residuals_at(&x)?;
            let column = match &base {
                Some(r0) => (plus - r0) / h,
                None => {
                    x[j] = self.params[j] - h;
                    let minus = self.residuals_at(&x)?;
                    (plus - minus) / (2.0 * h)
                }
            };
            jac.set_column(j, &column);
            x[j] = self.params[j];
        }
        Some(jac)
    }
}

/// Non-linear least-squares refinement with optional parameter covariance.
///
/// In [`RefinementMode::Standard`] the covariance is `s^2 (J^T J)^-1` with
/// `s^2 = RSS / (m - p)` over `m` residual components and `p` parameters. In
/// [`RefinementMode::Fast`] it is the unscaled pseudo-inverse of `J^T J`.
#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardtRefiner {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Evaluation budget factor in standard mode.
    pub patience: usize,
    /// Evaluation budget factor in fast mode.
    pub fast_patience: usize,
}

impl Default for LevenbergMarquardtRefiner {
    fn default() -> Self {
        Self {
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            patience: 100,
            fast_patience: 10,
        }
    }
}

impl LevenbergMarquardtRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patience(mut self, patience: usize, fast_patience: usize) -> Self {
        self.patience = patience.max(1);
        self.fast_patience = fast_patience.max(1);
        self
    }
}

/// Invert the normal matrix `J^T J`.
fn covariance_from_jacobian(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    mode: RefinementMode,
) -> Result<Covariance, RefinementError> {
    let jtj = jacobian.transpose() * jacobian;
    match mode {
        RefinementMode::Standard => {
            let inverse = jtj.cholesky().ok_or(RefinementError::Singular)?.inverse();
            let dof = jacobian.nrows().saturating_sub(jacobian.ncols()).max(1);
            let sigma_sq = residuals.norm_squared() / dof as f64;
            Ok(inverse * sigma_sq)
        }
        RefinementMode::Fast => jtj
            .pseudo_inverse(1e-12)
            .map_err(|_| RefinementError::Singular),
    }
}

impl<E: Parameterized> ModelRefiner<E> for LevenbergMarquardtRefiner {
    fn refine(
        &self,
        estimator: &E,
        data: Correspondences<'_, E::Input, E::Output>,
        inliers: &[usize],
        model: &E::Model,
        mode: RefinementMode,
        keep_covariance: bool,
    ) -> Result<Refinement<E::Model>, RefinementError> {
        let p = estimator.parameter_count();
        let m = inliers.len() * estimator.residual_dimension();
        if m < p {
            return Err(RefinementError::NotEnoughInliers {
                required: p.div_ceil(estimator.residual_dimension().max(1)),
                actual: inliers.len(),
            });
        }

        let params = estimator
            .to_params(model)
            .ok_or(RefinementError::InvalidModel)?;
        let (differences, patience) = match mode {
            RefinementMode::Standard => (Differences::Central, self.patience),
            RefinementMode::Fast => (Differences::Forward, self.fast_patience),
        };
        let problem = InlierProblem {
            estimator,
            data,
            inliers,
            params,
            differences,
        };

        let lm = LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_patience(patience);
        let (problem, report) = lm.minimize(problem);
        trace!(
            "LM refinement: {:?} after {} evaluations, objective {:.3e}",
            report.termination,
            report.number_of_evaluations,
            report.objective_function
        );
        match &report.termination {
            reason if reason.was_successful() => {}
            // Accepted steps never increase the cost, so the parameters are
            // still an improvement at the precision or budget limit.
            TerminationReason::NoImprovementPossible(_) | TerminationReason::LostPatience => {
                debug!("LM refinement stopped early: {:?}", report.termination);
            }
            _ => return Err(RefinementError::NotConverged),
        }

        let refined = estimator
            .from_params(&problem.params)
            .ok_or(RefinementError::InvalidModel)?;

        let covariance = if keep_covariance {
            let (Some(jacobian), Some(residuals)) = (problem.jacobian(), problem.residuals()) else {
                return Err(RefinementError::InvalidModel);
            };
            match covariance_from_jacobian(&jacobian, &residuals, mode) {
                Ok(cov) => Some(cov),
                Err(err) => {
                    debug!("covariance unavailable: {err}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Refinement {
            model: refined,
            covariance,
        })
    }
}
