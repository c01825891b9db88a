//! PROSAC sampler: progressively grows the subset of high-priority points.
//!
//! Correspondences are ordered once by descending quality score (ties keep
//! their original index order). Iteration `t` draws `m - 1` points from the
//! first `n_t - 1` ordered positions and always includes position `n_t - 1`,
//! where `n_t` follows the growth function of Chum & Matas (2005). After
//! `ransac_convergence_iterations` draws, or once the prefix covers every
//! point, sampling is uniform over the whole set.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::core::Sampler;
use crate::settings::DEFAULT_PROSAC_CONVERGENCE_ITERATIONS;
use crate::utils::UniformRandomGenerator;

pub struct ProsacSampler {
    rng: UniformRandomGenerator<usize>,
    /// Ordered position -> original correspondence index. Empty means the
    /// data is already sorted by quality.
    order: Vec<usize>,
    growth_function: Vec<usize>,
    sample_size: Option<usize>,
    point_number: usize,
    ransac_convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl Default for ProsacSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProsacSampler {
    /// Construct for data already sorted by decreasing quality.
    pub fn new() -> Self {
        Self::with_ransac_convergence_iterations(DEFAULT_PROSAC_CONVERGENCE_ITERATIONS)
    }

    pub fn with_ransac_convergence_iterations(ransac_convergence_iterations: usize) -> Self {
        Self::build(UniformRandomGenerator::new(), ransac_convergence_iterations)
    }

    /// Construct from a fixed RNG seed (useful for tests).
    pub fn from_seed(seed: u64, ransac_convergence_iterations: usize) -> Self {
        Self::build(
            UniformRandomGenerator::from_seed(seed),
            ransac_convergence_iterations,
        )
    }

    pub fn from_optional_seed(seed: Option<u64>, ransac_convergence_iterations: usize) -> Self {
        Self::build(
            UniformRandomGenerator::from_optional_seed(seed),
            ransac_convergence_iterations,
        )
    }

    fn build(rng: UniformRandomGenerator<usize>, ransac_convergence_iterations: usize) -> Self {
        Self {
            rng,
            order: Vec::new(),
            growth_function: Vec::new(),
            sample_size: None,
            point_number: 0,
            ransac_convergence_iterations: ransac_convergence_iterations.max(1),
            kth_sample_number: 1,
            subset_size: 0,
        }
    }

    /// Order the correspondences by `quality_scores`, highest first.
    pub fn with_quality_scores(mut self, quality_scores: &[f64]) -> Self {
        self.order = quality_order(quality_scores);
        self.sample_size = None;
        self
    }

    /// Ordered position -> correspondence index used for sampling.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Size of the prefix samples are currently drawn from.
    pub fn subset_size(&self) -> usize {
        self.subset_size
    }

    fn increment_iteration_number(&mut self) {
        self.kth_sample_number += 1;

        if self.kth_sample_number <= self.ransac_convergence_iterations
            && self.subset_size < self.point_number
            && self.kth_sample_number > self.growth_function[self.subset_size - 1]
        {
            self.subset_size += 1;
        }
    }

    pub fn initialize(&mut self, point_number: usize, sample_size: usize) {
        self.point_number = point_number;
        self.sample_size = Some(sample_size);
        self.growth_function.clear();
        self.growth_function.resize(point_number, 0);

        // T_m: expected number of samples drawn only from the top m points.
        let mut t_n = self.ransac_convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        let mut t_n_prime: usize = 1;
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + ((t_n_plus1 - t_n).ceil() as usize);
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }

        self.kth_sample_number = 1;
        self.subset_size = sample_size;
    }

    fn map_to_original(&self, out_indices: &mut [usize]) {
        if self.order.is_empty() {
            return;
        }
        for idx in out_indices.iter_mut() {
            *idx = self.order[*idx];
        }
    }
}

/// Indices sorted by decreasing quality. The sort is stable, so equal scores
/// keep increasing index order. NaN scores rank last.
pub fn quality_order(quality_scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..quality_scores.len()).collect();
    order.sort_by_key(|&i| {
        let q = quality_scores[i];
        Reverse(OrderedFloat(if q.is_nan() { f64::NEG_INFINITY } else { q }))
    });
    order
}

impl Sampler for ProsacSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0
            || point_count == 0
            || sample_size > point_count
            || out_indices.len() < sample_size
        {
            return false;
        }
        if !self.order.is_empty() && self.order.len() != point_count {
            return false;
        }

        if self.sample_size != Some(sample_size) || self.point_number != point_count {
            self.initialize(point_count, sample_size);
        }

        let sample = &mut out_indices[..sample_size];
        if self.kth_sample_number > self.ransac_convergence_iterations
            || self.subset_size >= point_count
        {
            self.rng.gen_unique(sample, 0, point_count - 1);
        } else {
            // m - 1 points from the first n - 1 positions, plus position n - 1.
            let last = self.subset_size - 1;
            if sample_size > 1 {
                self.rng.gen_unique(&mut sample[..sample_size - 1], 0, last - 1);
            }
            sample[sample_size - 1] = last;
        }
        self.map_to_original(sample);

        self.increment_iteration_number();
        true
    }

    fn reset(&mut self) {
        self.kth_sample_number = 1;
        if let Some(s) = self.sample_size {
            self.subset_size = s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unique(indices: &[usize]) {
        for i in 0..indices.len() {
            for j in (i + 1)..indices.len() {
                assert_ne!(indices[i], indices[j]);
            }
        }
    }

    #[test]
    fn prosac_sampler_respects_bounds_and_uniqueness() {
        let mut sampler = ProsacSampler::from_seed(5, 10);

        let sample_size = 3;
        let mut indices = vec![0usize; sample_size];

        // Exercise the growth phase and the uniform fallback.
        for _ in 0..40 {
            assert!(sampler.sample(20, sample_size, &mut indices));
            assert!(indices.iter().all(|&i| i < 20));
            assert_unique(&indices);
        }
    }

    #[test]
    fn first_sample_uses_best_points() {
        let scores = [0.1, 5.0, 0.3, 4.0, 0.2, 3.0, 0.5];
        let mut sampler = ProsacSampler::from_seed(11, 1000).with_quality_scores(&scores);
        assert_eq!(sampler.order(), &[1, 3, 5, 6, 2, 4, 0]);

        let mut indices = vec![0usize; 3];
        assert!(sampler.sample(scores.len(), 3, &mut indices));
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 3, 5]);
    }

    #[test]
    fn ties_keep_index_order() {
        assert_eq!(quality_order(&[1.0, 2.0, 1.0, 2.0]), vec![1, 3, 0, 2]);
        assert_eq!(quality_order(&[f64::NAN, 1.0]), vec![1, 0]);
    }

    #[test]
    fn subset_grows_monotonically() {
        let mut sampler = ProsacSampler::from_seed(3, 200);
        let mut indices = vec![0usize; 4];
        let mut last = 0;
        for _ in 0..150 {
            assert!(sampler.sample(50, 4, &mut indices));
            assert!(sampler.subset_size() >= last);
            last = sampler.subset_size();
        }
        assert!(last > 4);
    }

    #[test]
    fn reset_restarts_from_minimal_subset() {
        let mut sampler = ProsacSampler::from_seed(3, 200);
        let mut indices = vec![0usize; 2];
        for _ in 0..30 {
            sampler.sample(30, 2, &mut indices);
        }
        assert!(sampler.subset_size() > 2);
        sampler.reset();
        assert_eq!(sampler.subset_size(), 2);
    }

    #[test]
    fn mismatched_ordering_is_rejected() {
        let mut sampler = ProsacSampler::from_seed(1, 100).with_quality_scores(&[1.0, 2.0, 3.0]);
        let mut indices = vec![0usize; 2];
        assert!(!sampler.sample(4, 2, &mut indices));
    }
}
