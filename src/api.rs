//! High-level Rust API.
//!
//! One function per bundled model. Each builds a [`RobustEstimator`] with the
//! requested method and settings, attaches the matching refiner, runs it and
//! collects the outcome in an [`EstimationResult`].

use nalgebra::{Point2, Point3};

use crate::core::Estimator;
use crate::engine::RobustEstimator;
use crate::error::Result;
use crate::estimators::{
    DualQuadricEstimator, EuclideanTransform2DEstimator, HomographyEstimator,
    PinholeCameraEstimator, QuadricEstimator, RigidTransformEstimator,
};
use crate::models::{
    DualQuadric, EuclideanTransform2D, Homography, PinholeCamera, Plane, Quadric, RigidTransform,
};
use crate::optimisers::{LeastSquaresRefiner, LevenbergMarquardtRefiner, ModelRefiner};
use crate::settings::{RobustMethod, RobustSettings};
use crate::types::{Covariance, InliersData};

/// Result of a robust estimation.
#[derive(Debug, Clone)]
pub struct EstimationResult<M> {
    /// The estimated (and, if enabled, refined) model.
    pub model: M,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub num_inliers: usize,
    /// Parameter covariance, when `keep_covariance` was set and available.
    pub covariance: Option<Covariance>,
    /// Number of iterations performed.
    pub iterations: usize,
}

fn run<'a, E: Estimator>(
    robust: RobustEstimator<'a, E>,
    refiner: Box<dyn ModelRefiner<E> + 'a>,
    quality_scores: Option<&'a [f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<E::Model>> {
    let mut settings = settings.unwrap_or_default();
    settings.compute_and_keep_inliers = true;
    robust.set_settings(settings)?;
    robust.set_refiner(refiner)?;
    if let Some(scores) = quality_scores.filter(|_| robust.method().requires_quality_scores()) {
        robust.set_quality_scores(scores)?;
    }

    let model = robust.estimate()?;
    let inliers_data = robust
        .inliers_data()
        .unwrap_or_else(|| InliersData::new(None, None, 0));
    Ok(EstimationResult {
        model,
        inliers: inliers_data.inlier_indices().unwrap_or_default(),
        num_inliers: inliers_data.num_inliers(),
        covariance: robust.covariance(),
        iterations: robust.iterations(),
    })
}

/// Estimate a 2D rotation + translation from point correspondences.
///
/// `quality_scores` are required by the PROSAC-based methods and ignored by
/// the others.
pub fn estimate_euclidean_transform_2d(
    inputs: &[Point2<f64>],
    outputs: &[Point2<f64>],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<EuclideanTransform2D>> {
    let robust = RobustEstimator::new(EuclideanTransform2DEstimator::new(), method);
    if let Some(s) = &settings {
        robust.set_use_weak_minimum_size(s.use_weak_minimum_size)?;
    }
    robust.set_correspondences(inputs, outputs)?;
    run(robust, Box::new(LevenbergMarquardtRefiner::new()), quality_scores, settings)
}

/// Estimate a 3D rigid transform from point correspondences.
pub fn estimate_rigid_transform(
    inputs: &[Point3<f64>],
    outputs: &[Point3<f64>],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<RigidTransform>> {
    let robust = RobustEstimator::new(RigidTransformEstimator::new(), method);
    if let Some(s) = &settings {
        robust.set_use_weak_minimum_size(s.use_weak_minimum_size)?;
    }
    robust.set_correspondences(inputs, outputs)?;
    run(robust, Box::new(LevenbergMarquardtRefiner::new()), quality_scores, settings)
}

/// Estimate a homography from 2D point correspondences.
pub fn estimate_homography(
    inputs: &[Point2<f64>],
    outputs: &[Point2<f64>],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<Homography>> {
    let robust = RobustEstimator::with_correspondences(HomographyEstimator::new(), method, inputs, outputs)?;
    run(robust, Box::new(LeastSquaresRefiner::new()), quality_scores, settings)
}

/// Estimate a pinhole camera from 3D world points and their 2D projections.
pub fn estimate_pinhole_camera(
    world_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<PinholeCamera>> {
    let robust =
        RobustEstimator::with_correspondences(PinholeCameraEstimator::new(), method, world_points, image_points)?;
    run(robust, Box::new(LevenbergMarquardtRefiner::new()), quality_scores, settings)
}

/// Estimate a point quadric from 3D points lying on it.
pub fn estimate_quadric(
    points: &[Point3<f64>],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<Quadric>> {
    let robust = RobustEstimator::with_entities(QuadricEstimator::new(), method, points)?;
    run(robust, Box::new(LeastSquaresRefiner::new()), quality_scores, settings)
}

/// Estimate a dual quadric from planes tangent to it.
pub fn estimate_dual_quadric(
    planes: &[Plane],
    method: RobustMethod,
    quality_scores: Option<&[f64]>,
    settings: Option<RobustSettings>,
) -> Result<EstimationResult<DualQuadric>> {
    let robust = RobustEstimator::with_entities(DualQuadricEstimator::new(), method, planes)?;
    run(robust, Box::new(LeastSquaresRefiner::new()), quality_scores, settings)
}
