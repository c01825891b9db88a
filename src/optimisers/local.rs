use crate::core::Estimator;
use crate::error::RefinementError;
use crate::types::Correspondences;

use super::{ModelRefiner, Refinement, RefinementMode};

/// Least-squares refiner that refits the model using all inliers.
///
/// This requires the estimator to support non-minimal fitting (i.e. fitting
/// from more than the minimal sample size). No covariance is produced.
///
/// In standard mode the candidate with the lowest inlier residual sum is kept,
/// and the refit is repeated up to `max_iterations` times while it keeps
/// improving. Fast mode performs a single refit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeastSquaresRefiner {
    max_iterations: usize,
}

impl Default for LeastSquaresRefiner {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

impl LeastSquaresRefiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }
}

fn inlier_cost<E: Estimator>(
    estimator: &E,
    data: Correspondences<'_, E::Input, E::Output>,
    inliers: &[usize],
    model: &E::Model,
) -> f64 {
    inliers
        .iter()
        .map(|&i| estimator.residual(model, data.input(i), data.output(i)).powi(2))
        .sum()
}

impl<E: Estimator> ModelRefiner<E> for LeastSquaresRefiner {
    fn refine(
        &self,
        estimator: &E,
        data: Correspondences<'_, E::Input, E::Output>,
        inliers: &[usize],
        model: &E::Model,
        mode: RefinementMode,
        _keep_covariance: bool,
    ) -> Result<Refinement<E::Model>, RefinementError> {
        let required = estimator.non_minimal_sample_size();
        if inliers.len() < required {
            return Err(RefinementError::NotEnoughInliers {
                required,
                actual: inliers.len(),
            });
        }

        let iterations = match mode {
            RefinementMode::Standard => self.max_iterations,
            RefinementMode::Fast => 1,
        };

        let mut current = model.clone();
        let mut current_cost = inlier_cost(estimator, data, inliers, &current);
        let mut refitted = false;
        for _ in 0..iterations {
            let best = estimator
                .estimate_model_nonminimal(data, inliers)
                .into_iter()
                .map(|m| (inlier_cost(estimator, data, inliers, &m), m))
                .filter(|(cost, _)| cost.is_finite())
                .min_by(|a, b| a.0.total_cmp(&b.0));

            match best {
                Some((cost, candidate)) if !refitted || cost < current_cost => {
                    refitted = true;
                    current = candidate;
                    current_cost = cost;
                }
                Some(_) => break,
                None if refitted => break,
                None => return Err(RefinementError::NotConverged),
            }
        }

        Ok(Refinement::without_covariance(current))
    }
}
