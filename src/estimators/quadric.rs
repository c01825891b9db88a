//! Quadric and dual quadric estimators from single sequences of points or
//! planes.
//!
//! A quadric has ten homogeneous entries and nine degrees of freedom, so both
//! estimators need nine entities. Residuals are algebraic and scale-free: the
//! model matrix is taken at unit Frobenius norm and the entity at unit norm.

use nalgebra::{DMatrix, Matrix4, Point3, Vector4};

use crate::core::Estimator;
use crate::models::{symmetric_design_row, symmetric_from_params, DualQuadric, Plane, Quadric};
use crate::types::Correspondences;
use crate::utils::{normalizing_transform_3d, null_vector};

use super::has_distinct_indices;

const QUADRIC_SAMPLE_SIZE: usize = 9;

/// Solve `v_i^T Q v_i = 0` for a symmetric `Q` in the least-squares sense.
fn fit_symmetric(vectors: impl ExactSizeIterator<Item = Vector4<f64>>) -> Option<Matrix4<f64>> {
    let mut a = DMatrix::<f64>::zeros(vectors.len(), 10);
    for (i, v) in vectors.enumerate() {
        for (j, c) in symmetric_design_row(&v).into_iter().enumerate() {
            a[(i, j)] = c;
        }
    }
    let q = null_vector(&a)?;
    let mut params = [0.0; 10];
    params.copy_from_slice(q.as_slice());
    Some(symmetric_from_params(&params))
}

/// `|v^T M v| / (|M|_F |v|^2)`.
fn algebraic_residual(m: &Matrix4<f64>, v: &Vector4<f64>) -> f64 {
    let scale = m.norm() * v.norm_squared();
    if scale <= f64::EPSILON {
        return f64::INFINITY;
    }
    v.dot(&(m * v)).abs() / scale
}

/// Fits a point quadric `x^T Q x = 0` to 3D points.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadricEstimator;

impl QuadricEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for QuadricEstimator {
    type Input = Point3<f64>;
    type Output = ();
    type Model = Quadric;

    fn sample_size(&self) -> usize {
        QUADRIC_SAMPLE_SIZE
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        for (i, &a) in sample.iter().enumerate() {
            for &b in &sample[i + 1..] {
                if (data.input(a) - data.input(b)).norm_squared() < 1e-20 {
                    return false;
                }
            }
        }
        true
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        if sample.len() < self.sample_size() {
            return Vec::new();
        }
        let (points, _) = data.gather(sample);
        let Some(u) = normalizing_transform_3d(points.iter().copied()) else {
            return Vec::new();
        };
        let Some(q_norm) = fit_symmetric(points.iter().map(|p| u * p.to_homogeneous())) else {
            return Vec::new();
        };
        // x_n = U x  =>  x^T (U^T Q_n U) x = 0
        let q = u.transpose() * q_norm * u;
        if q.iter().any(|v| !v.is_finite()) {
            return Vec::new();
        }
        vec![Quadric::new(q)]
    }

    fn is_valid_model(
        &self,
        model: &Self::Model,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        model.q.norm() > f64::EPSILON
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, _output: &()) -> f64 {
        algebraic_residual(&model.q, &input.to_homogeneous())
    }
}

/// Fits a dual quadric `pi^T Q* pi = 0` to planes, e.g. tangent planes of a
/// surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualQuadricEstimator;

impl DualQuadricEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for DualQuadricEstimator {
    type Input = Plane;
    type Output = ();
    type Model = DualQuadric;

    fn sample_size(&self) -> usize {
        QUADRIC_SAMPLE_SIZE
    }

    fn is_valid_sample(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() || !has_distinct_indices(sample) {
            return false;
        }
        let mut units = Vec::with_capacity(sample.len());
        for &i in sample {
            match data.input(i).unit_vector() {
                Some(v) => units.push(v),
                None => return false,
            }
        }
        // Planes equal up to scale carry no new constraint.
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                if 1.0 - a.dot(b).abs() < 1e-12 {
                    return false;
                }
            }
        }
        true
    }

    fn estimate_model(&self, data: Correspondences<'_, Self::Input, Self::Output>, sample: &[usize]) -> Vec<Self::Model> {
        if sample.len() < self.sample_size() {
            return Vec::new();
        }
        let units: Option<Vec<Vector4<f64>>> = sample.iter().map(|&i| data.input(i).unit_vector()).collect();
        let Some(units) = units else {
            return Vec::new();
        };
        let Some(q) = fit_symmetric(units.into_iter()) else {
            return Vec::new();
        };
        if q.iter().any(|v| !v.is_finite()) {
            return Vec::new();
        }
        vec![DualQuadric::new(q)]
    }

    fn is_valid_model(
        &self,
        model: &Self::Model,
        _data: Correspondences<'_, Self::Input, Self::Output>,
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        model.q.norm() > f64::EPSILON
    }

    fn residual(&self, model: &Self::Model, input: &Self::Input, _output: &()) -> f64 {
        algebraic_residual(&model.q, &input.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sphere_directions(n: usize) -> Vec<Vector3<f64>> {
        // Fibonacci lattice on the unit sphere.
        let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
        (0..n)
            .map(|i| {
                let y = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
                let r = (1.0 - y * y).sqrt();
                let theta = golden * i as f64;
                Vector3::new(r * theta.cos(), y, r * theta.sin())
            })
            .collect()
    }

    #[test]
    fn quadric_fits_ellipsoid_points() {
        let center = Point3::new(0.5, -1.0, 2.0);
        let points: Vec<Point3<f64>> = sphere_directions(20)
            .into_iter()
            .map(|d| center + Vector3::new(2.0 * d.x, 1.0 * d.y, 0.5 * d.z))
            .collect();
        let entities = vec![(); points.len()];
        let data = Correspondences::new(&points, &entities).unwrap();
        let est = QuadricEstimator::new();

        let sample: Vec<usize> = (0..9).map(|i| 2 * i).collect();
        assert!(est.is_valid_sample(data, &sample));
        let models = est.estimate_model(data, &sample);
        assert_eq!(models.len(), 1);
        assert!(est.is_valid_model(&models[0], data, &sample, 1.0));
        for p in &points {
            assert!(est.residual(&models[0], p, &()) < 1e-9);
        }
        assert!(est.residual(&models[0], &center, &()) > 1e-3);
    }

    #[test]
    fn dual_quadric_matches_sphere_dual() {
        let center = Point3::new(1.0, 2.0, -1.0);
        let radius = 3.0;
        let planes: Vec<Plane> = sphere_directions(12)
            .into_iter()
            .map(|n| Plane::from_point_normal(&(center + n * radius), &n))
            .collect();
        let entities = vec![(); planes.len()];
        let data = Correspondences::new(&planes, &entities).unwrap();
        let est = DualQuadricEstimator::new();

        let sample: Vec<usize> = (0..9).collect();
        assert!(est.is_valid_sample(data, &sample));
        let models = est.estimate_model(data, &sample);
        assert_eq!(models.len(), 1);

        let expected = Quadric::sphere(&center, radius).dual().unwrap();
        assert_relative_eq!(models[0].normalized(), expected.normalized(), epsilon = 1e-8);
        for plane in &planes {
            assert!(est.residual(&models[0], plane, &()) < 1e-10);
        }
    }

    #[test]
    fn repeated_planes_are_degenerate() {
        let mut planes = vec![Plane::new(0.0, 0.0, 1.0, -1.0); 9];
        for (i, p) in planes.iter_mut().enumerate().skip(1) {
            p.v.x = i as f64;
        }
        planes[3] = Plane::new(0.0, 0.0, 2.0, -2.0);
        let entities = vec![(); 9];
        let data = Correspondences::new(&planes, &entities).unwrap();
        let sample: Vec<usize> = (0..9).collect();
        assert!(!DualQuadricEstimator::new().is_valid_sample(data, &sample));
    }
}
