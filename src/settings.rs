//! Configuration types for the robust estimators.
//!
//! A [`RobustMethod`] selects a strategy pair (sampler + scoring). The numeric
//! knobs live in [`RobustSettings`], which can be validated and round-tripped
//! through JSON.

use serde::{Deserialize, Serialize};

use crate::error::RobustEstimatorError;

/// Scoring strategy used to evaluate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringType {
    /// Inlier count, ties broken by the lower inlier residual sum.
    Ransac,
    /// Truncated quadratic loss `min(r^2, t^2)`.
    Msac,
    /// Median residual.
    Lmeds,
}

/// Sampling strategy for minimal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerType {
    Uniform,
    Prosac,
}

/// Robust estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobustMethod {
    Ransac,
    Msac,
    Lmeds,
    #[default]
    Prosac,
    Promeds,
}

impl RobustMethod {
    pub const ALL: [RobustMethod; 5] = [
        RobustMethod::Ransac,
        RobustMethod::Msac,
        RobustMethod::Lmeds,
        RobustMethod::Prosac,
        RobustMethod::Promeds,
    ];

    pub fn sampler(self) -> SamplerType {
        match self {
            RobustMethod::Ransac | RobustMethod::Msac | RobustMethod::Lmeds => SamplerType::Uniform,
            RobustMethod::Prosac | RobustMethod::Promeds => SamplerType::Prosac,
        }
    }

    pub fn scoring(self) -> ScoringType {
        match self {
            RobustMethod::Ransac | RobustMethod::Prosac => ScoringType::Ransac,
            RobustMethod::Msac => ScoringType::Msac,
            RobustMethod::Lmeds | RobustMethod::Promeds => ScoringType::Lmeds,
        }
    }

    /// Whether the method needs per-correspondence quality scores.
    pub fn requires_quality_scores(self) -> bool {
        self.sampler() == SamplerType::Prosac
    }
}

pub const DEFAULT_THRESHOLD: f64 = 1.0;
pub const DEFAULT_CONFIDENCE: f64 = 0.99;
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;
pub const DEFAULT_MIN_ITERATIONS: usize = 1;
pub const DEFAULT_PROGRESS_DELTA: f32 = 0.05;
pub const DEFAULT_PROSAC_CONVERGENCE_ITERATIONS: usize = 100_000;

/// Numeric configuration shared by every robust method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustSettings {
    /// Inlier threshold in the residual domain of the estimator. For the
    /// median-based methods this is the stop threshold: estimation ends as soon
    /// as the best median residual drops to or below it.
    pub threshold: f64,
    /// Desired probability in \[0, 1\] that an outlier-free sample was drawn.
    pub confidence: f64,
    /// Hard cap on the number of iterations.
    pub max_iterations: usize,
    /// Lower bound for the adaptively computed iteration count.
    pub min_iterations: usize,
    /// Minimum progress increase in \[0, 1\] between two progress notifications.
    pub progress_delta: f32,
    pub refine_result: bool,
    pub keep_covariance: bool,
    pub fast_refinement: bool,
    pub compute_and_keep_inliers: bool,
    pub compute_and_keep_residuals: bool,
    /// Use the estimator's reduced minimal sample size.
    pub use_weak_minimum_size: bool,
    /// Iterations after which PROSAC degenerates to uniform sampling.
    pub prosac_convergence_iterations: usize,
    /// Fixed RNG seed, mostly for reproducible tests.
    pub seed: Option<u64>,
}

impl Default for RobustSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            confidence: DEFAULT_CONFIDENCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            min_iterations: DEFAULT_MIN_ITERATIONS,
            progress_delta: DEFAULT_PROGRESS_DELTA,
            refine_result: true,
            keep_covariance: false,
            fast_refinement: false,
            compute_and_keep_inliers: true,
            compute_and_keep_residuals: true,
            use_weak_minimum_size: false,
            prosac_convergence_iterations: DEFAULT_PROSAC_CONVERGENCE_ITERATIONS,
            seed: None,
        }
    }
}

pub(crate) fn check_threshold(threshold: f64) -> Result<(), RobustEstimatorError> {
    if threshold.is_nan() || threshold <= 0.0 {
        return Err(RobustEstimatorError::invalid(format!(
            "threshold must be positive, got {threshold}"
        )));
    }
    Ok(())
}

pub(crate) fn check_confidence(confidence: f64) -> Result<(), RobustEstimatorError> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(RobustEstimatorError::invalid(format!(
            "confidence must be in [0, 1], got {confidence}"
        )));
    }
    Ok(())
}

pub(crate) fn check_iterations(name: &str, iterations: usize) -> Result<(), RobustEstimatorError> {
    if iterations < 1 {
        return Err(RobustEstimatorError::invalid(format!(
            "{name} must be at least 1"
        )));
    }
    Ok(())
}

pub(crate) fn check_iteration_bounds(min: usize, max: usize) -> Result<(), RobustEstimatorError> {
    if min > max {
        return Err(RobustEstimatorError::invalid(format!(
            "min iterations ({min}) exceed max iterations ({max})"
        )));
    }
    Ok(())
}

pub(crate) fn check_progress_delta(delta: f32) -> Result<(), RobustEstimatorError> {
    if !(0.0..=1.0).contains(&delta) {
        return Err(RobustEstimatorError::invalid(format!(
            "progress delta must be in [0, 1], got {delta}"
        )));
    }
    Ok(())
}

impl RobustSettings {
    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<(), RobustEstimatorError> {
        check_threshold(self.threshold)?;
        check_confidence(self.confidence)?;
        check_iterations("max iterations", self.max_iterations)?;
        check_iterations("min iterations", self.min_iterations)?;
        check_iteration_bounds(self.min_iterations, self.max_iterations)?;
        check_progress_delta(self.progress_delta)?;
        check_iterations(
            "PROSAC convergence iterations",
            self.prosac_convergence_iterations,
        )?;
        Ok(())
    }

    /// Parse and validate settings from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RobustEstimatorError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| RobustEstimatorError::invalid(format!("malformed settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> String {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let cfg = RobustSettings::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_iterations, 5000);
        assert!((cfg.confidence - 0.99).abs() < 1e-12);
        assert!(cfg.refine_result);
        assert!(!cfg.keep_covariance);
        assert!(cfg.compute_and_keep_inliers);
        assert!(cfg.compute_and_keep_residuals);
    }

    #[test]
    fn method_maps_to_strategy_pair() {
        assert_eq!(RobustMethod::Ransac.sampler(), SamplerType::Uniform);
        assert_eq!(RobustMethod::Msac.scoring(), ScoringType::Msac);
        assert_eq!(RobustMethod::Lmeds.scoring(), ScoringType::Lmeds);
        assert_eq!(RobustMethod::Prosac.sampler(), SamplerType::Prosac);
        assert_eq!(RobustMethod::Prosac.scoring(), ScoringType::Ransac);
        assert_eq!(RobustMethod::Promeds.sampler(), SamplerType::Prosac);
        assert_eq!(RobustMethod::Promeds.scoring(), ScoringType::Lmeds);
        assert!(RobustMethod::Promeds.requires_quality_scores());
        assert!(!RobustMethod::Msac.requires_quality_scores());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = RobustSettings {
            threshold: 0.0,
            ..RobustSettings::default()
        };
        assert!(cfg.validate().is_err());
        cfg.threshold = 1.0;
        cfg.confidence = 1.5;
        assert!(cfg.validate().is_err());
        cfg.confidence = 0.5;
        cfg.max_iterations = 0;
        assert!(cfg.validate().is_err());
        cfg.max_iterations = 10;
        cfg.min_iterations = 20;
        assert!(cfg.validate().is_err());
        cfg.min_iterations = 1;
        cfg.progress_delta = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn json_round_trip_keeps_fields() {
        let cfg = RobustSettings {
            threshold: 0.25,
            seed: Some(7),
            fast_refinement: true,
            ..RobustSettings::default()
        };
        let json = cfg.to_json_string();
        let parsed = RobustSettings::from_json_str(&json).unwrap();
        assert_eq!(parsed, cfg);

        let partial = RobustSettings::from_json_str(r#"{ "threshold": 2.0 }"#).unwrap();
        assert_eq!(partial.threshold, 2.0);
        assert_eq!(partial.max_iterations, DEFAULT_MAX_ITERATIONS);

        assert!(RobustSettings::from_json_str(r#"{ "threshold": -1.0 }"#).is_err());
    }
}
