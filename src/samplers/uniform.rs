//! Uniform random sampler drawing minimal samples without replacement.

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// Uniform random sampler drawing minimal samples without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator<usize>,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomSampler {
    /// Construct a new sampler with a random seed.
    pub fn new() -> Self {
        Self {
            rng: UniformRandomGenerator::new(),
        }
    }

    /// Construct a sampler from a fixed seed (primarily for tests).
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
        }
    }

    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        Self {
            rng: UniformRandomGenerator::from_optional_seed(seed),
        }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0
            || point_count == 0
            || sample_size > point_count
            || out_indices.len() < sample_size
        {
            return false;
        }

        self.rng
            .gen_unique(&mut out_indices[..sample_size], 0, point_count - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::UniformRandomSampler;
    use crate::core::Sampler;

    #[test]
    fn uniform_sampler_respects_bounds_and_uniqueness() {
        let mut sampler = UniformRandomSampler::from_seed(7);

        let sample_size = 4;
        let mut indices = vec![0usize; sample_size];

        for _ in 0..50 {
            assert!(sampler.sample(10, sample_size, &mut indices));
            assert!(indices.iter().all(|&i| i < 10));
            for i in 0..indices.len() {
                for j in (i + 1)..indices.len() {
                    assert_ne!(indices[i], indices[j]);
                }
            }
        }
    }

    #[test]
    fn uniform_sampler_fails_when_sample_too_large() {
        let mut sampler = UniformRandomSampler::from_seed(1);
        let mut indices = vec![0usize; 5];
        assert!(!sampler.sample(3, 5, &mut indices));
        assert!(!sampler.sample(0, 0, &mut indices));
    }

    #[test]
    fn uniform_sampler_is_deterministic_with_fixed_seed() {
        let mut s1 = UniformRandomSampler::from_seed(123);
        let mut s2 = UniformRandomSampler::from_seed(123);

        let sample_size = 5;
        let mut a = vec![0usize; sample_size];
        let mut b = vec![0usize; sample_size];

        for _ in 0..10 {
            assert!(s1.sample(15, sample_size, &mut a));
            assert!(s2.sample(15, sample_size, &mut b));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn full_sample_draws_every_index() {
        let mut sampler = UniformRandomSampler::from_seed(9);
        let mut indices = vec![0usize; 6];
        assert!(sampler.sample(6, 6, &mut indices));
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }
}
