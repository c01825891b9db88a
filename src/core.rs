//! Core traits of the robust estimation pipeline.
//!
//! The engine in [`engine`](crate::engine) is generic over these seams:
//! - [`Estimator`]: minimal-sample model fitter plus residual function.
//! - [`Sampler`]: draws minimal samples.
//! - [`Scoring`]: ranks a candidate model from its residuals.
//! - [`TerminationCriterion`]: adapts the iteration budget.
//! - [`ModelRefiner`](crate::optimisers::ModelRefiner): optional refinement of
//!   the consensus model on its inliers.

use crate::scoring::Score;
use crate::types::Correspondences;

/// Estimator responsible for generating model hypotheses from minimal samples
/// and measuring how well a model explains a correspondence.
pub trait Estimator {
    /// Input entity of a correspondence.
    type Input;
    /// Output entity of a correspondence. `()` for single-sequence problems.
    type Output: Clone;
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Size of a minimal sample for this estimator.
    fn sample_size(&self) -> usize;

    /// Reduced minimal sample size tolerated for degenerate configurations.
    fn weak_sample_size(&self) -> usize {
        self.sample_size()
    }

    /// Minimal number of correspondences for a non-minimal (least-squares) fit.
    fn non_minimal_sample_size(&self) -> usize {
        self.sample_size()
    }

    /// Check whether a given sample is geometrically valid.
    fn is_valid_sample(
        &self,
        data: Correspondences<'_, Self::Input, Self::Output>,
        sample: &[usize],
    ) -> bool;

    /// Estimate candidate models from a sample. Empty on degenerate input.
    fn estimate_model(
        &self,
        data: Correspondences<'_, Self::Input, Self::Output>,
        sample: &[usize],
    ) -> Vec<Self::Model>;

    /// Estimate a model from an over-determined sample.
    fn estimate_model_nonminimal(
        &self,
        data: Correspondences<'_, Self::Input, Self::Output>,
        sample: &[usize],
    ) -> Vec<Self::Model> {
        self.estimate_model(data, sample)
    }

    /// Validate a candidate model before scoring.
    fn is_valid_model(
        &self,
        _model: &Self::Model,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        true
    }

    /// Non-negative error of one correspondence under `model`.
    fn residual(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output) -> f64;
}

/// Sampler responsible for drawing minimal samples.
pub trait Sampler {
    /// Draw `sample_size` distinct indices in `[0, point_count)` into
    /// `out_indices`.
    ///
    /// Returns `false` if a valid sample could not be drawn.
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool;

    /// Forget any progressive state, e.g. between two estimations.
    fn reset(&mut self) {}
}

/// Scoring strategy used to evaluate model quality and determine inliers.
pub trait Scoring {
    /// Inlier/outlier threshold for residuals in the chosen domain.
    fn threshold(&self) -> f64;

    /// Score residuals of a model, writing the inlier flags into `inliers_out`.
    fn score(&self, residuals: &[f64], sample_size: usize, inliers_out: &mut Vec<bool>) -> Score;
}

/// Termination criterion deciding when the consensus loop can stop.
pub trait TerminationCriterion {
    /// Recompute the iteration budget after the best score improved.
    ///
    /// `max_iterations` is the configured cap; `budget` is the running
    /// requirement and may grow or shrink within `[min, max_iterations]`.
    /// Returns `true` if the loop should terminate immediately.
    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: usize,
        budget: &mut usize,
    ) -> bool;
}

/// Number of iterations needed to draw at least one outlier-free sample of
/// `sample_size` with probability `confidence`, given inlier ratio
/// `inlier_ratio`: `log(1 - confidence) / log(1 - inlier_ratio^sample_size)`.
///
/// Returns `None` when the formula is undefined (ratio of zero) and
/// `Some(0)` when every sample is outlier-free.
pub fn required_iterations(confidence: f64, inlier_ratio: f64, sample_size: usize) -> Option<usize> {
    let inlier_ratio = inlier_ratio.clamp(0.0, 1.0);
    if inlier_ratio <= 0.0 {
        return None;
    }
    let p_good_sample = inlier_ratio.powi(sample_size as i32);
    if p_good_sample >= 1.0 || confidence <= 0.0 {
        return Some(0);
    }
    if confidence >= 1.0 {
        return Some(usize::MAX);
    }
    let log_one_minus_conf = (1.0 - confidence).ln();
    let log_one_minus_p = (1.0 - p_good_sample).ln();
    if !log_one_minus_p.is_finite() || log_one_minus_p >= 0.0 {
        return Some(usize::MAX);
    }
    let required = (log_one_minus_conf / log_one_minus_p).ceil();
    Some(if required >= usize::MAX as f64 {
        usize::MAX
    } else {
        required.max(0.0) as usize
    })
}

/// RANSAC-style termination: the iteration budget follows the current best
/// inlier ratio and the desired confidence, clamped to
/// `[min_iterations, max_iterations]`.
///
/// Median-based scorings additionally stop as soon as the best median residual
/// reaches `stop_threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacTerminationCriterion {
    /// Desired confidence in \[0, 1\].
    pub confidence: f64,
    pub min_iterations: usize,
    pub stop_threshold: Option<f64>,
}

impl RansacTerminationCriterion {
    pub fn new(confidence: f64, min_iterations: usize) -> Self {
        Self {
            confidence,
            min_iterations,
            stop_threshold: None,
        }
    }

    pub fn with_stop_threshold(mut self, stop_threshold: f64) -> Self {
        self.stop_threshold = Some(stop_threshold);
        self
    }
}

impl TerminationCriterion for RansacTerminationCriterion {
    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: usize,
        budget: &mut usize,
    ) -> bool {
        if point_count == 0 {
            return false;
        }

        let inlier_ratio = best_score.inlier_count as f64 / point_count as f64;
        let floor = self.min_iterations.min(max_iterations);
        // A better score may carry a lower inlier ratio (MSAC, LMedS), so the
        // budget is recomputed from scratch rather than only lowered.
        *budget = required_iterations(self.confidence, inlier_ratio, sample_size)
            .map_or(max_iterations, |required| required.clamp(floor, max_iterations));

        match (self.stop_threshold, best_score.median_residual) {
            (Some(stop), Some(median)) => median <= stop,
            _ => false,
        }
    }
}
