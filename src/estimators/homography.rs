//! Homography estimator using the normalized DLT.

use nalgebra::{DMatrix, Matrix3, Point2};

use crate::core::Estimator;
use crate::models::Homography;
use crate::types::Correspondences;
use crate::utils::{collinearity_2d, normalizing_transform_2d, null_vector};

use super::has_distinct_indices;

/// Minimal homography estimator using a 4-point normalized DLT.
///
/// The same solver handles over-determined samples in the least-squares sense.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyEstimator;

impl HomographyEstimator {
    pub fn new() -> Self {
        Self
    }

    fn solve(&self, data: Correspondences<'_, Point2<f64>, Point2<f64>>, sample: &[usize]) -> Option<Homography> {
        let (inputs, outputs) = data.gather(sample);
        let t1 = normalizing_transform_2d(inputs.iter().copied())?;
        let t2 = normalizing_transform_2d(outputs.iter().copied())?;

        // Two rows per correspondence of  [x]_x H x1 = 0  in normalized coordinates.
        let mut a = DMatrix::<f64>::zeros(2 * sample.len(), 9);
        for (i, (p1, p2)) in inputs.iter().zip(outputs.iter()).enumerate() {
            let x1 = t1 * p1.to_homogeneous();
            let x2 = t2 * p2.to_homogeneous();
            let (u, v, w) = (x2.x, x2.y, x2.z);

            for k in 0..3 {
                a[(2 * i, 3 + k)] = -w * x1[k];
                a[(2 * i, 6 + k)] = v * x1[k];
                a[(2 * i + 1, k)] = w * x1[k];
                a[(2 * i + 1, 6 + k)] = -u * x1[k];
            }
        }

        let h = null_vector(&a)?;
        let h_norm = Matrix3::from_row_slice(h.as_slice());
        let t2_inv = t2.try_inverse()?;
        let h_mat = t2_inv * h_norm * t1;
        if h_mat.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Homography::new(h_mat))
    }
}

impl Estimator for HomographyEstimator {
    type Input = Point2<f64>;
    type Output = Point2<f64>;
    type Model = Homography;

    fn sample_size(&self) -> usize {
        4
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        if sample.len() > self.sample_size() {
            return true;
        }
        // No three points of the minimal sample may be collinear, on either side.
        let (inputs, outputs) = data.gather(sample);
        for pts in [&inputs, &outputs] {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    for k in (j + 1)..4 {
                        if collinearity_2d(pts[i], pts[j], pts[k]) < 1e-10 {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        if sample.len() < self.sample_size() {
            return Vec::new();
        }
        self.solve(data, sample).into_iter().collect()
    }

    fn is_valid_model(
        &self,
        model: &Homography,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        let det = model.normalized().determinant().abs();
        det > 1e-10
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output) -> f64 {
        model
            .transform_point(input)
            .map_or(f64::INFINITY, |p| (p - output).norm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn truth() -> Homography {
        Homography::new(Matrix3::new(1.1, 0.05, 3.0, -0.02, 0.95, -2.0, 1e-3, -5e-4, 1.0))
    }

    fn grid() -> Vec<Point2<f64>> {
        let mut pts = Vec::new();
        for i in 0..4 {
            for j in 0..3 {
                pts.push(Point2::new(10.0 * i as f64 + (j as f64) * 1.3, 7.0 * j as f64 - i as f64));
            }
        }
        pts
    }

    #[test]
    fn minimal_and_overdetermined_fits_are_exact() {
        let h = truth();
        let inputs = grid();
        let outputs: Vec<_> = inputs.iter().map(|p| h.transform_point(p).unwrap()).collect();
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        let est = HomographyEstimator::new();

        let minimal = [0usize, 5, 7, 11];
        assert!(est.is_valid_sample(data, &minimal));
        let models = est.estimate_model(data, &minimal);
        assert_eq!(models.len(), 1);
        assert!(est.is_valid_model(&models[0], data, &minimal, 1.0));
        assert_relative_eq!(models[0].normalized(), h.normalized(), epsilon = 1e-9);

        let all: Vec<usize> = (0..inputs.len()).collect();
        let models = est.estimate_model_nonminimal(data, &all);
        assert_relative_eq!(models[0].normalized(), h.normalized(), epsilon = 1e-9);
        for (p, q) in inputs.iter().zip(outputs.iter()) {
            assert!(est.residual(&models[0], p, q) < 1e-8);
        }
    }

    #[test]
    fn collinear_minimal_sample_is_rejected() {
        let inputs = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 5.0),
        ];
        let data = Correspondences::new(&inputs, &inputs).unwrap();
        let est = HomographyEstimator::new();
        assert!(!est.is_valid_sample(data, &[0, 1, 2, 3]));
        assert!(!est.is_valid_sample(data, &[0, 1, 3, 3]));
    }
}
