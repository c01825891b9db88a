//! Pinhole camera resection from 3D-2D correspondences (normalized DLT).

use nalgebra::{DMatrix, DVector, Matrix3, Matrix3x4, Point2, Point3, Rotation3, Vector3};

use crate::core::Estimator;
use crate::models::PinholeCamera;
use crate::optimisers::Parameterized;
use crate::types::Correspondences;
use crate::utils::{normalizing_transform_2d, normalizing_transform_3d, null_vector};

use super::has_distinct_indices;

/// Estimates the full 3x4 projection matrix of a pinhole camera.
///
/// Six correspondences in general position (not coplanar) are required.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinholeCameraEstimator;

impl PinholeCameraEstimator {
    pub fn new() -> Self {
        Self
    }

    fn solve(&self, data: Correspondences<'_, Point3<f64>, Point2<f64>>, sample: &[usize]) -> Option<PinholeCamera> {
        let (world, image) = data.gather(sample);
        let u = normalizing_transform_3d(world.iter().copied())?;
        let t = normalizing_transform_2d(image.iter().copied())?;

        let mut a = DMatrix::<f64>::zeros(2 * sample.len(), 12);
        for (i, (xw, xi)) in world.iter().zip(image.iter()).enumerate() {
            let x = u * xw.to_homogeneous();
            let y = t * xi.to_homogeneous();
            for k in 0..4 {
                a[(2 * i, 4 + k)] = -y.z * x[k];
                a[(2 * i, 8 + k)] = y.y * x[k];
                a[(2 * i + 1, k)] = y.z * x[k];
                a[(2 * i + 1, 8 + k)] = -y.x * x[k];
            }
        }

        let p = null_vector(&a)?;
        let p_norm = Matrix3x4::from_row_slice(p.as_slice());
        let p_mat = t.try_inverse()? * p_norm * u;
        if p_mat.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(PinholeCamera::new(p_mat))
    }
}

/// Whether the points span 3D space (not all on one plane).
fn spans_space(points: &[&Point3<f64>]) -> bool {
    let n = points.len() as f64;
    let c = points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let mut scatter = Matrix3::zeros();
    for p in points {
        let d = p.coords - c;
        scatter += d * d.transpose();
    }
    let sv = scatter.singular_values();
    let max = sv.max();
    max > 1e-20 && sv.min() > 1e-10 * max
}

impl Estimator for PinholeCameraEstimator {
    type Input = Point3<f64>;
    type Output = Point2<f64>;
    type Model = PinholeCamera;

    fn sample_size(&self) -> usize {
        6
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        let (world, _) = data.gather(sample);
        spans_space(&world)
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        if sample.len() < self.sample_size() {
            return Vec::new();
        }
        self.solve(data, sample).into_iter().collect()
    }

    fn is_valid_model(
        &self,
        model: &Self::Model,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        let m = model.normalized().fixed_view::<3, 3>(0, 0).into_owned();
        m.determinant().abs() > 1e-12
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output) -> f64 {
        model
            .project(input)
            .map_or(f64::INFINITY, |p| (p - output).norm())
    }
}

impl Parameterized for PinholeCameraEstimator {
    fn parameter_count(&self) -> usize {
        11
    }

    fn residual_dimension(&self) -> usize {
        2
    }

    /// `[fx, fy, skew, cx, cy, rx, ry, rz, tx, ty, tz]`: intrinsics, rotation
    /// vector and translation of `P = K [R | t]`.
    fn to_params(&self, model: &Self::Model) -> Option<DVector<f64>> {
        let d = model.decompose()?;
        let k = d.intrinsics;
        let w = d.rotation.scaled_axis();
        let t = d.translation;
        Some(DVector::from_vec(vec![
            k[(0, 0)],
            k[(1, 1)],
            k[(0, 1)],
            k[(0, 2)],
            k[(1, 2)],
            w.x,
            w.y,
            w.z,
            t.x,
            t.y,
            t.z,
        ]))
    }

    fn from_params(&self, params: &DVector<f64>) -> Option<Self::Model> {
        if params.len() != 11 || params.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let k = Matrix3::new(
            params[0], params[2], params[3], //
            0.0, params[1], params[4], //
            0.0, 0.0, 1.0,
        );
        let r = Rotation3::new(Vector3::new(params[5], params[6], params[7]));
        let t = Vector3::new(params[8], params[9], params[10]);
        Some(PinholeCamera::from_parts(&k, &r, &t))
    }

    fn residual_components(&self, model: &Self::Model, input: &Self::Input, output: &Self::Output, out: &mut [f64]) {
        match model.project(input) {
            Some(p) => {
                out[0] = p.x - output.x;
                out[1] = p.y - output.y;
            }
            None => {
                out[0] = f64::INFINITY;
                out[1] = f64::INFINITY;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PinholeCamera {
        let k = Matrix3::new(900.0, 0.0, 320.0, 0.0, 880.0, 250.0, 0.0, 0.0, 1.0);
        let r = Rotation3::from_euler_angles(0.1, 0.25, -0.05);
        PinholeCamera::from_parts(&k, &r, &Vector3::new(0.2, -0.1, 6.0))
    }

    fn world() -> Vec<Point3<f64>> {
        vec![
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.5),
            Point3::new(1.0, 1.0, -0.5),
            Point3::new(-1.0, 1.0, 1.0),
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(0.5, -0.5, -1.0),
            Point3::new(-0.3, 0.8, 0.3),
            Point3::new(0.9, 0.1, 1.5),
        ]
    }

    #[test]
    fn dlt_recovers_projection_matrix() {
        let cam = camera();
        let inputs = world();
        let outputs: Vec<_> = inputs.iter().map(|x| cam.project(x).unwrap()).collect();
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        let est = PinholeCameraEstimator::new();

        let sample = [0usize, 1, 2, 3, 4, 5];
        assert!(est.is_valid_sample(data, &sample));
        let models = est.estimate_model(data, &sample);
        assert_eq!(models.len(), 1);
        assert!(est.is_valid_model(&models[0], data, &sample, 1.0));
        assert_relative_eq!(models[0].normalized(), cam.normalized(), epsilon = 1e-8);
        assert!(est.residual(&models[0], &inputs[7], &outputs[7]) < 1e-6);
    }

    #[test]
    fn coplanar_points_are_degenerate() {
        let inputs: Vec<_> = (0..6)
            .map(|i| Point3::new(i as f64, (i * i) as f64, 1.0))
            .collect();
        let outputs = vec![Point2::origin(); 6];
        let data = Correspondences::new(&inputs, &outputs).unwrap();
        assert!(!PinholeCameraEstimator::new().is_valid_sample(data, &[0, 1, 2, 3, 4, 5]));
    }

    #[test]
    fn parameters_round_trip() {
        let est = PinholeCameraEstimator::new();
        let cam = camera();
        let params = est.to_params(&cam).unwrap();
        assert_relative_eq!(params[0], 900.0, epsilon = 1e-8);
        let back = est.from_params(&params).unwrap();
        assert_relative_eq!(back.normalized(), cam.normalized(), epsilon = 1e-10);
    }
}
