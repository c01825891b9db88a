//! Runtime wrappers exposing the built-in components via enums while the engine
//! stays generic over the core traits. Each enum holds the concrete variants
//! plus a `Dyn` escape hatch for custom implementations.

use crate::core::{RansacTerminationCriterion, Sampler, Scoring, TerminationCriterion};
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{LmedsScoring, MsacScoring, RansacScoring, Score};
use crate::settings::{RobustMethod, RobustSettings, SamplerType, ScoringType};

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Prosac(ProsacSampler),
    Dyn(Box<dyn Sampler + Send>),
}

impl Default for SamplerChoice {
    fn default() -> Self {
        SamplerChoice::Uniform(UniformRandomSampler::new())
    }
}

impl Sampler for SamplerChoice {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(point_count, sample_size, out_indices),
            SamplerChoice::Prosac(s) => s.sample(point_count, sample_size, out_indices),
            SamplerChoice::Dyn(s) => s.sample(point_count, sample_size, out_indices),
        }
    }

    fn reset(&mut self) {
        match self {
            SamplerChoice::Uniform(s) => s.reset(),
            SamplerChoice::Prosac(s) => s.reset(),
            SamplerChoice::Dyn(s) => s.reset(),
        }
    }
}

/// Runtime scoring selection.
pub enum ScoringChoice {
    Ransac(RansacScoring),
    Msac(MsacScoring),
    Lmeds(LmedsScoring),
    Dyn(Box<dyn Scoring + Send>),
}

impl Scoring for ScoringChoice {
    fn threshold(&self) -> f64 {
        match self {
            ScoringChoice::Ransac(s) => s.threshold(),
            ScoringChoice::Msac(s) => s.threshold(),
            ScoringChoice::Lmeds(s) => s.threshold(),
            ScoringChoice::Dyn(s) => s.threshold(),
        }
    }

    fn score(&self, residuals: &[f64], sample_size: usize, inliers_out: &mut Vec<bool>) -> Score {
        match self {
            ScoringChoice::Ransac(s) => s.score(residuals, sample_size, inliers_out),
            ScoringChoice::Msac(s) => s.score(residuals, sample_size, inliers_out),
            ScoringChoice::Lmeds(s) => s.score(residuals, sample_size, inliers_out),
            ScoringChoice::Dyn(s) => s.score(residuals, sample_size, inliers_out),
        }
    }
}

/// Runtime termination selection.
pub enum TerminationChoice {
    Ransac(RansacTerminationCriterion),
    Dyn(Box<dyn TerminationCriterion + Send>),
}

impl TerminationCriterion for TerminationChoice {
    fn check(
        &mut self,
        point_count: usize,
        best_score: &Score,
        sample_size: usize,
        max_iterations: usize,
        budget: &mut usize,
    ) -> bool {
        match self {
            TerminationChoice::Ransac(term) => {
                term.check(point_count, best_score, sample_size, max_iterations, budget)
            }
            TerminationChoice::Dyn(term) => {
                term.check(point_count, best_score, sample_size, max_iterations, budget)
            }
        }
    }
}

/// Build the sampler for `method`. PROSAC orders the correspondences by
/// `quality_scores` when given.
pub fn sampler_for(
    method: RobustMethod,
    settings: &RobustSettings,
    quality_scores: Option<&[f64]>,
) -> SamplerChoice {
    match method.sampler() {
        SamplerType::Uniform => {
            SamplerChoice::Uniform(UniformRandomSampler::from_optional_seed(settings.seed))
        }
        SamplerType::Prosac => {
            let sampler = ProsacSampler::from_optional_seed(
                settings.seed,
                settings.prosac_convergence_iterations,
            );
            SamplerChoice::Prosac(match quality_scores {
                Some(scores) => sampler.with_quality_scores(scores),
                None => sampler,
            })
        }
    }
}

/// Build the scoring for `method` from the configured threshold.
pub fn scoring_for(method: RobustMethod, settings: &RobustSettings) -> ScoringChoice {
    match method.scoring() {
        ScoringType::Ransac => ScoringChoice::Ransac(RansacScoring::new(settings.threshold)),
        ScoringType::Msac => ScoringChoice::Msac(MsacScoring::new(settings.threshold)),
        ScoringType::Lmeds => ScoringChoice::Lmeds(LmedsScoring::new(settings.threshold)),
    }
}

/// Build the termination criterion for `method`. Median-based methods stop as
/// soon as the best median residual reaches the threshold.
pub fn termination_for(method: RobustMethod, settings: &RobustSettings) -> TerminationChoice {
    let term = RansacTerminationCriterion::new(settings.confidence, settings.min_iterations);
    TerminationChoice::Ransac(match method.scoring() {
        ScoringType::Lmeds => term.with_stop_threshold(settings.threshold),
        ScoringType::Ransac | ScoringType::Msac => term,
    })
}
