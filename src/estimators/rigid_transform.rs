//! Rigid transform estimator using Procrustes analysis.

use nalgebra::{DVector, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3, SVD};

use crate::core::Estimator;
use crate::models::RigidTransform;
use crate::optimisers::Parameterized;
use crate::types::Correspondences;

use super::has_distinct_indices;

/// Rigid transform estimator using Procrustes analysis.
///
/// Four correspondences form the regular minimal sample; three non-collinear
/// ones are enough for the weak minimum size.
#[derive(Debug, Clone, Copy, Default)]
pub struct RigidTransformEstimator;

impl RigidTransformEstimator {
    pub fn new() -> Self {
        Self
    }
}

/// Whether the sampled points span at least a plane.
fn spans_plane(points: &[&Point3<f64>]) -> bool {
    let n = points.len() as f64;
    let c = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p.coords - c;
        scatter += d * d.transpose();
    }
    let mut sv = scatter.singular_values();
    sv.as_mut_slice().sort_by(|a, b| b.total_cmp(a));
    sv[0] > 1e-20 && sv[1] > 1e-10 * sv[0]
}

impl Estimator for RigidTransformEstimator {
    type Input = Point3<f64>;
    type Output = Point3<f64>;
    type Model = RigidTransform;

    fn sample_size(&self) -> usize {
        4
    }

    fn weak_sample_size(&self) -> usize {
        3
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.weak_sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        let (inputs, outputs) = data.gather(sample);
        spans_plane(&inputs) && spans_plane(&outputs)
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        let n = sample.len();
        if n < self.weak_sample_size() {
            return Vec::new();
        }
        let (inputs, outputs) = data.gather(sample);

        let c0 = inputs.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n as f64;
        let c1 = outputs.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n as f64;

        let mut avg_dist0 = 0.0;
        let mut avg_dist1 = 0.0;
        for (p0, p1) in inputs.iter().zip(outputs.iter()) {
            avg_dist0 += (p0.coords - c0).norm();
            avg_dist1 += (p1.coords - c1).norm();
        }
        avg_dist0 /= n as f64;
        avg_dist1 /= n as f64;
        if avg_dist0 < 1e-10 || avg_dist1 < 1e-10 {
            return Vec::new();
        }

        // Scale each cloud for numerical stability; rotation is unaffected.
        let s0 = 3.0_f64.sqrt() / avg_dist0;
        let s1 = 3.0_f64.sqrt() / avg_dist1;

        // H = sum (p0 - c0)(p1 - c1)^T
        let mut h = Matrix3::zeros();
        for (p0, p1) in inputs.iter().zip(outputs.iter()) {
            h += ((p0.coords - c0) * s0) * ((p1.coords - c1) * s1).transpose();
        }
        if h.iter().any(|x| !x.is_finite()) {
            return Vec::new();
        }

        // H = U S V^T, then R = V U^T
        let svd = SVD::new(h, true, true);
        let (Some(u), Some(vt)) = (svd.u, svd.v_t) else {
            return Vec::new();
        };
        let mut v = vt.transpose();
        let mut r = v * u.transpose();

        // Ensure proper rotation (det(R) = 1)
        if r.determinant() < 0.0 {
            v.column_mut(2).neg_mut();
            r = v * u.transpose();
        }

        let t = c1 - r * c0;
        vec![RigidTransform::from_rt(r, t)]
    }

    fn is_valid_model(
        &self,
        model: &Self::Model,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        let det = model.rotation.to_rotation_matrix().matrix().determinant();
        (det - 1.0).abs() < 1e-6 && model.translation.vector.iter().all(|v| v.is_finite())
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output) -> f64 {
        (model.transform_point(input) - output).norm()
    }
}

impl Parameterized for RigidTransformEstimator {
    fn parameter_count(&self) -> usize {
        6
    }

    fn residual_dimension(&self) -> usize {
        3
    }

    /// Rotation vector (axis * angle) followed by the translation.
    fn to_params(&self, model: &Self::Model) -> Option<DVector<f64>> {
        let w = model.rotation.scaled_axis();
        let t = model.translation.vector;
        Some(DVector::from_vec(vec![w.x, w.y, w.z, t.x, t.y, t.z]))
    }

    fn from_params(&self, params: &DVector<f64>) -> Option<Self::Model> {
        if params.len() != 6 || params.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let w = Vector3::new(params[0], params[1], params[2]);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::new(w));
        Some(RigidTransform::new(
            rotation,
            Translation3::new(params[3], params[4], params[5]),
        ))
    }

    fn residual_components(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output, out: &mut [f64]) {
        let d = model.transform_point(input) - output;
        out[..3].copy_from_slice(d.as_slice());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(1.0, 1.0, 1.0),
        ]
    }

    #[test]
    fn procrustes_recovers_rotation_and_translation() {
        let truth = RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.3, -0.4, 1.1),
            Translation3::new(2.0, -1.0, 0.5),
        );
        let inputs = cloud();
        let outputs: Vec<_> = inputs.iter().map(|p| truth.transform_point(p)).collect();
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        let est = RigidTransformEstimator::new();

        for sample in [&[0usize, 1, 2, 3][..], &[1, 2, 4][..]] {
            assert!(est.is_valid_sample(data, sample));
            let models = est.estimate_model(data, sample);
            assert_eq!(models.len(), 1);
            assert!(est.is_valid_model(&models[0], data, sample, 1.0));
            assert!(models[0].rotation.angle_to(&truth.rotation) < 1e-10);
            assert_relative_eq!(models[0].translation.vector, truth.translation.vector, epsilon = 1e-10);
        }
    }

    #[test]
    fn collinear_sample_is_rejected() {
        let inputs: Vec<_> = (0..4).map(|i| Point3::new(i as f64, 2.0 * i as f64, 0.0)).collect();
        let data = Correspondences::new(&inputs, &inputs).unwrap();
        assert!(!RigidTransformEstimator::new().is_valid_sample(data, &[0, 1, 2, 3]));
    }

    #[test]
    fn parameters_round_trip() {
        let est = RigidTransformEstimator::new();
        let model = RigidTransform::new(
            UnitQuaternion::from_euler_angles(-0.2, 0.1, 2.0),
            Translation3::new(0.1, 0.2, 0.3),
        );
        let back = est.from_params(&est.to_params(&model).unwrap()).unwrap();
        assert!(back.rotation.angle_to(&model.rotation) < 1e-12);
        assert_relative_eq!(back.translation.vector, model.translation.vector);
    }
}
