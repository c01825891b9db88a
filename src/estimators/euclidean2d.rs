//! 2D Euclidean transform estimator (rotation + translation) from point pairs.

use nalgebra::{DVector, Point2, Vector2};

use crate::core::Estimator;
use crate::models::EuclideanTransform2D;
use crate::optimisers::Parameterized;
use crate::types::Correspondences;

use super::has_distinct_indices;

/// Closed-form least-squares fit of a planar rotation and translation.
///
/// Three correspondences form the regular minimal sample; two are enough for
/// the weak minimum size, since the model has three degrees of freedom.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanTransform2DEstimator;

impl EuclideanTransform2DEstimator {
    pub fn new() -> Self {
        Self
    }

    fn fit(&self, data: Correspondences<'_, Point2<f64>, Point2<f64>>, sample: &[usize]) -> Option<EuclideanTransform2D> {
        let n = sample.len() as f64;
        let (inputs, outputs) = data.gather(sample);

        let c_in = inputs.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
        let c_out = outputs.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;

        // Kabsch in 2D: the optimal angle maximises sum(R a . b).
        let mut dot = 0.0;
        let mut cross = 0.0;
        let mut spread = 0.0;
        for (a, b) in inputs.iter().zip(outputs.iter()) {
            let a = a.coords - c_in;
            let b = b.coords - c_out;
            dot += a.dot(&b);
            cross += a.x * b.y - a.y * b.x;
            spread += a.norm_squared();
        }
        if spread < 1e-20 || (dot.abs() < 1e-300 && cross.abs() < 1e-300) {
            return None;
        }

        let angle = cross.atan2(dot);
        let model = EuclideanTransform2D::new(angle, Vector2::zeros());
        let translation = c_out - model.rotation * c_in;
        let model = EuclideanTransform2D::new(angle, translation);
        (angle.is_finite() && translation.iter().all(|v| v.is_finite())).then_some(model)
    }
}

impl Estimator for EuclideanTransform2DEstimator {
    type Input = Point2<f64>;
    type Output = Point2<f64>;
    type Model = EuclideanTransform2D;

    fn sample_size(&self) -> usize {
        3
    }

    fn weak_sample_size(&self) -> usize {
        2
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.weak_sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        // At least two distinct input locations are needed to fix the angle.
        let first = data.input(sample[0]);
        sample[1..]
            .iter()
            .any(|&i| (data.input(i) - first).norm_squared() > 1e-20)
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        if sample.len() < self.weak_sample_size() {
            return Vec::new();
        }
        self.fit(data, sample).into_iter().collect()
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output) -> f64 {
        (model.transform_point(input) - output).norm()
    }
}

impl Parameterized for EuclideanTransform2DEstimator {
    fn parameter_count(&self) -> usize {
        3
    }

    fn residual_dimension(&self) -> usize {
        2
    }

    fn to_params(&self, model: &Self::Model) -> Option<DVector<f64>> {
        let t = model.translation.vector;
        Some(DVector::from_vec(vec![model.angle(), t.x, t.y]))
    }

    fn from_params(&self, params: &DVector<f64>) -> Option<Self::Model> {
        if params.len() != 3 || params.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(EuclideanTransform2D::new(params[0], Vector2::new(params[1], params[2])))
    }

    fn residual_components(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output, out: &mut [f64]) {
        let d = model.transform_point(input) - output;
        out[0] = d.x;
        out[1] = d.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square_data(model: &EuclideanTransform2D) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let inputs = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(0.0, 3.0),
            Point2::new(4.0, 3.0),
        ];
        let outputs = inputs.iter().map(|p| model.transform_point(p)).collect();
        (inputs, outputs)
    }

    #[test]
    fn recovers_exact_transform_from_minimal_and_weak_samples() {
        let truth = EuclideanTransform2D::new(0.7, Vector2::new(-3.0, 12.5));
        let (inputs, outputs) = square_data(&truth);
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        let est = EuclideanTransform2DEstimator::new();

        for sample in [&[0usize, 1, 2][..], &[1, 3][..]] {
            assert!(est.is_valid_sample(data, sample));
            let models = est.estimate_model(data, sample);
            assert_eq!(models.len(), 1);
            assert_relative_eq!(models[0].angle(), 0.7, epsilon = 1e-12);
            assert_relative_eq!(models[0].translation.vector, truth.translation.vector, epsilon = 1e-12);
            assert!(est.residual(&models[0], &inputs[3], &outputs[3]) < 1e-12);
        }
    }

    #[test]
    fn coincident_inputs_are_degenerate() {
        let inputs = vec![Point2::new(1.0, 1.0); 3];
        let outputs = vec![Point2::new(2.0, 1.0); 3];
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        let est = EuclideanTransform2DEstimator::new();
        assert!(!est.is_valid_sample(data, &[0, 1, 2]));
        assert!(est.estimate_model(data, &[0, 1, 2]).is_empty());
        assert!(!est.is_valid_sample(data, &[0, 0, 1]));
    }

    #[test]
    fn parameters_round_trip() {
        let est = EuclideanTransform2DEstimator::new();
        let model = EuclideanTransform2D::new(-1.2, Vector2::new(0.5, 7.0));
        let params = est.to_params(&model).unwrap();
        let back = est.from_params(&params).unwrap();
        assert_relative_eq!(back.angle(), model.angle(), epsilon = 1e-12);
        assert_relative_eq!(back.translation.vector, model.translation.vector);
    }
}
