//! Estimators for geometric models.
//!
//! This module contains the bundled model fitters:
//! - 2D Euclidean transform (rotation + translation)
//! - 3D rigid transform
//! - Homography
//! - Pinhole camera resection
//! - Point quadric and dual quadric

pub mod euclidean2d;
pub mod homography;
pub mod pinhole_camera;
pub mod quadric;
pub mod rigid_transform;

pub use euclidean2d::EuclideanTransform2DEstimator;
pub use homography::HomographyEstimator;
pub use pinhole_camera::PinholeCameraEstimator;
pub use quadric::{DualQuadricEstimator, QuadricEstimator};
pub use rigid_transform::RigidTransformEstimator;

/// Whether every index of `sample` is distinct.
pub(crate) fn has_distinct_indices(sample: &[usize]) -> bool {
    for i in 0..sample.len() {
        for j in (i + 1)..sample.len() {
            if sample[i] == sample[j] {
                return false;
            }
        }
    }
    true
}
