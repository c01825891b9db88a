//! # sacfit - Robust model estimation
//!
//! `sacfit` fits geometric models to data contaminated by outliers. The
//! consensus loop supports RANSAC, MSAC, LMedS, PROSAC and PROMedS, and the
//! winning model can be refined on its inliers with an optional parameter
//! covariance.
//!
//! ## Quick Start
//!
//! The easiest way to use `sacfit` is through the high-level API functions:
//!
//! ```rust
//! use nalgebra::{Point2, Vector2};
//! use sacfit::{estimate_euclidean_transform_2d, RobustMethod};
//! use sacfit::models::EuclideanTransform2D;
//!
//! let truth = EuclideanTransform2D::new(0.3, Vector2::new(1.0, -2.0));
//! let inputs: Vec<_> = (0..20)
//!     .map(|i| Point2::new((i % 5) as f64, (i / 5) as f64))
//!     .collect();
//! let outputs: Vec<_> = inputs.iter().map(|p| truth.transform_point(p)).collect();
//!
//! let result =
//!     estimate_euclidean_transform_2d(&inputs, &outputs, RobustMethod::Ransac, None, None).unwrap();
//! assert_eq!(result.num_inliers, 20);
//! ```
//!
//! ## Using the engine directly
//!
//! [`RobustEstimator`] exposes every setting, a progress listener and the
//! per-run results (inliers, residuals, covariance, iteration count).
//! Configuration is rejected with [`RobustEstimatorError::Locked`] while an
//! estimation is running.
//!
//! ## Extending the Library
//!
//! - **[`Estimator`](core::Estimator)**: new model types
//! - **[`Sampler`](core::Sampler)**: custom sampling strategies
//! - **[`Scoring`](core::Scoring)**: custom model scores
//! - **[`TerminationCriterion`](core::TerminationCriterion)**: custom stopping rules
//! - **[`ModelRefiner`](optimisers::ModelRefiner)**: custom refinement
//! - **[`Parameterized`](optimisers::Parameterized)**: enables Levenberg-Marquardt
//!   refinement and covariance for an estimator
//! - **[`RobustEstimatorListener`]**: progress notifications
//!
//! ### Example: Custom Estimator
//!
//! ```rust
//! use sacfit::core::Estimator;
//! use sacfit::types::Correspondences;
//! use sacfit::{RobustEstimator, RobustMethod};
//!
//! /// Fits a constant to a sequence of scalars.
//! struct Constant;
//!
//! impl Estimator for Constant {
//!     type Input = f64;
//!     type Output = ();
//!     type Model = f64;
//!
//!     fn sample_size(&self) -> usize {
//!         1
//!     }
//!
//!     fn is_valid_sample(&self, _data: Correspondences<'_, f64, ()>, _sample: &[usize]) -> bool {
//!         true
//!     }
//!
//!     fn estimate_model(&self, data: Correspondences<'_, f64, ()>, sample: &[usize]) -> Vec<f64> {
//!         vec![*data.input(sample[0])]
//!     }
//!
//!     fn residual(&self, model: &f64, input: &f64, _output: &()) -> f64 {
//!         (model - input).abs()
//!     }
//! }
//!
//! let values = [2.0, 2.0, 2.0, 9.0, 2.0];
//! let robust = RobustEstimator::with_entities(Constant, RobustMethod::Msac, &values).unwrap();
//! robust.set_threshold(0.1).unwrap();
//! robust.set_refine_result(false).unwrap();
//! assert_eq!(robust.estimate().unwrap(), 2.0);
//! ```
//!
//! ## Modules
//!
//! - **[`api`]**: one call per bundled model
//! - **[`engine`]**: the configurable robust estimator
//! - **[`core`]**: extension traits
//! - **[`estimators`]** and **[`models`]**: bundled models
//! - **[`samplers`]**, **[`scoring`]**, **[`choices`]**: strategy building blocks
//! - **[`optimisers`]**: refinement and covariance
//! - **[`settings`]**: serialisable configuration

pub mod api;
pub mod choices;
pub mod core;
pub mod engine;
pub mod error;
pub mod estimators;
pub mod models;
pub mod optimisers;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod utils;

pub use api::{
    estimate_dual_quadric, estimate_euclidean_transform_2d, estimate_homography,
    estimate_pinhole_camera, estimate_quadric, estimate_rigid_transform, EstimationResult,
};

pub use core::{Estimator, Sampler, Scoring, TerminationCriterion};

pub use engine::{RobustEstimator, RobustEstimatorListener};
pub use error::{RefinementError, RobustEstimatorError};
pub use settings::{RobustMethod, RobustSettings};
