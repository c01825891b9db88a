//! Consensus scoring.
//!
//! Every scoring turns the residuals of a candidate model into a [`Score`] and
//! an inlier partition:
//! - [`RansacScoring`]: inlier count, ties broken by the lower inlier residual sum.
//! - [`MsacScoring`]: negated truncated quadratic loss `sum(min(r^2, t^2))`.
//! - [`LmedsScoring`]: negated median residual; inliers come from a robust
//!   scale estimate around the median.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::core::Scoring;

/// Score of a candidate model. Higher is better.
///
/// Scores compare lexicographically on `(primary, secondary)`; `inlier_count`
/// only drives the adaptive iteration budget.
#[derive(Debug, Clone, Copy)]
pub struct Score {
    pub inlier_count: usize,
    pub primary: f64,
    pub secondary: f64,
    /// Median residual, for median-based scorings.
    pub median_residual: Option<f64>,
}

impl Score {
    /// RANSAC score: more inliers first, then the smaller residual sum.
    pub fn inlier_count(inlier_count: usize, inlier_residual_sum: f64) -> Self {
        Self {
            inlier_count,
            primary: inlier_count as f64,
            secondary: -inlier_residual_sum,
            median_residual: None,
        }
    }

    /// MSAC score from the truncated loss sum.
    pub fn truncated_loss(loss: f64, inlier_count: usize) -> Self {
        Self {
            inlier_count,
            primary: -loss,
            secondary: inlier_count as f64,
            median_residual: None,
        }
    }

    /// LMedS score from the median residual.
    pub fn median(median_residual: f64, inlier_count: usize) -> Self {
        Self {
            inlier_count,
            primary: -median_residual,
            secondary: inlier_count as f64,
            median_residual: Some(median_residual),
        }
    }

    fn key(&self) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
        (OrderedFloat(self.primary), OrderedFloat(self.secondary))
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.key().cmp(&other.key()))
    }
}

/// RANSAC inlier-count scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacScoring {
    threshold: f64,
}

impl RansacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for RansacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], _sample_size: usize, inliers_out: &mut Vec<bool>) -> Score {
        inliers_out.clear();
        let mut inlier_count = 0usize;
        let mut residual_sum = 0.0;
        for &r in residuals {
            let is_inlier = r <= self.threshold;
            if is_inlier {
                inlier_count += 1;
                residual_sum += r;
            }
            inliers_out.push(is_inlier);
        }
        Score::inlier_count(inlier_count, residual_sum)
    }
}

/// MSAC truncated quadratic scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MsacScoring {
    threshold: f64,
}

impl MsacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for MsacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], _sample_size: usize, inliers_out: &mut Vec<bool>) -> Score {
        inliers_out.clear();
        let threshold_sq = self.threshold * self.threshold;
        let mut inlier_count = 0usize;
        let mut loss = 0.0;
        for &r in residuals {
            let r_sq = r * r;
            let is_inlier = r <= self.threshold;
            if is_inlier {
                inlier_count += 1;
            }
            loss += r_sq.min(threshold_sq);
            inliers_out.push(is_inlier);
        }
        Score::truncated_loss(loss, inlier_count)
    }
}

/// Robust standard deviation of the residuals from their median
/// (Rousseeuw & Leroy), corrected for small samples.
pub fn lmeds_sigma(median_residual: f64, point_count: usize, sample_size: usize) -> f64 {
    let dof = point_count.saturating_sub(sample_size).max(1) as f64;
    1.4826 * (1.0 + 5.0 / dof) * median_residual
}

/// Factor applied to [`lmeds_sigma`] to classify inliers.
pub const LMEDS_INLIER_FACTOR: f64 = 2.5;

/// Median of `values`, reordering the slice. `None` when empty or when any
/// value is NaN.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let n = values.len();
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by_key(mid, |&v| OrderedFloat(v));
    let upper = *upper;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower_max = lower
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .map_or(upper, |v| v.0);
    Some(0.5 * (lower_max + upper))
}

/// LMedS scoring.
///
/// `stop_threshold` doubles as the lower bound of the inlier threshold, so that
/// exact data (median close to zero) still yields a usable inlier set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmedsScoring {
    stop_threshold: f64,
}

impl LmedsScoring {
    pub fn new(stop_threshold: f64) -> Self {
        Self { stop_threshold }
    }
}

impl Scoring for LmedsScoring {
    fn threshold(&self) -> f64 {
        self.stop_threshold
    }

    fn score(&self, residuals: &[f64], sample_size: usize, inliers_out: &mut Vec<bool>) -> Score {
        inliers_out.clear();
        let mut scratch = residuals.to_vec();
        let Some(median_residual) = median(&mut scratch) else {
            inliers_out.resize(residuals.len(), false);
            return Score::median(f64::INFINITY, 0);
        };

        let sigma = lmeds_sigma(median_residual, residuals.len(), sample_size);
        let inlier_threshold = (LMEDS_INLIER_FACTOR * sigma).max(self.stop_threshold);

        let mut inlier_count = 0usize;
        for &r in residuals {
            let is_inlier = r <= inlier_threshold;
            if is_inlier {
                inlier_count += 1;
            }
            inliers_out.push(is_inlier);
        }
        Score::median(median_residual, inlier_count)
    }
}
