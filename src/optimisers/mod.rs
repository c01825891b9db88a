//! Refinement of the consensus model on its inliers.
//!
//! After the consensus loop finds its best hypothesis, a [`ModelRefiner`] can
//! polish the model using every inlier and, when asked, estimate the
//! covariance of its parameters.
//!
//! ## Example: custom refinement
//!
//! ```rust
//! use sacfit::core::Estimator;
//! use sacfit::error::RefinementError;
//! use sacfit::optimisers::{ModelRefiner, Refinement, RefinementMode};
//! use sacfit::types::Correspondences;
//!
//! /// Leaves the model untouched.
//! struct KeepModel;
//!
//! impl<E: Estimator> ModelRefiner<E> for KeepModel {
//!     fn refine(
//!         &self,
//!         _estimator: &E,
//!         _data: Correspondences<'_, E::Input, E::Output>,
//!         _inliers: &[usize],
//!         model: &E::Model,
//!         _mode: RefinementMode,
//!         _keep_covariance: bool,
//!     ) -> Result<Refinement<E::Model>, RefinementError> {
//!         Ok(Refinement::without_covariance(model.clone()))
//!     }
//! }
//! ```

use nalgebra::DVector;

use crate::core::Estimator;
use crate::error::RefinementError;
use crate::types::{Correspondences, Covariance};

pub mod levenberg;
pub mod local;

pub use levenberg::LevenbergMarquardtRefiner;
pub use local::LeastSquaresRefiner;

/// How much effort the refinement may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementMode {
    /// Full budget, central-difference Jacobian, scaled covariance.
    #[default]
    Standard,
    /// Reduced budget, forward-difference Jacobian, unscaled covariance.
    Fast,
}

impl RefinementMode {
    pub fn from_fast_flag(fast: bool) -> Self {
        if fast {
            RefinementMode::Fast
        } else {
            RefinementMode::Standard
        }
    }
}

/// Outcome of a successful refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement<M> {
    pub model: M,
    /// Parameter covariance, when requested and numerically available.
    pub covariance: Option<Covariance>,
}

impl<M> Refinement<M> {
    pub fn without_covariance(model: M) -> Self {
        Self {
            model,
            covariance: None,
        }
    }
}

/// Refinement strategy applied to the best model and its inliers.
pub trait ModelRefiner<E: Estimator> {
    /// Refine `model` using the correspondences addressed by `inliers`.
    ///
    /// Errors are non-fatal for the caller: the unrefined model remains valid.
    fn refine(
        &self,
        estimator: &E,
        data: Correspondences<'_, E::Input, E::Output>,
        inliers: &[usize],
        model: &E::Model,
        mode: RefinementMode,
        keep_covariance: bool,
    ) -> Result<Refinement<E::Model>, RefinementError>;
}

/// Estimators whose models map to a minimal parameter vector, so that they can
/// be refined by non-linear least squares.
pub trait Parameterized: Estimator {
    /// Length of the parameter vector (also the covariance size).
    fn parameter_count(&self) -> usize;

    /// Number of signed residual components per correspondence.
    fn residual_dimension(&self) -> usize;

    fn to_params(&self, model: &Self::Model) -> Option<DVector<f64>>;

    /// `None` when the parameters do not describe a valid model.
    fn from_params(&self, params: &DVector<f64>) -> Option<Self::Model>;

    /// Write the signed residual components of one correspondence into `out`
    /// (length [`residual_dimension`](Self::residual_dimension)).
    fn residual_components(
        &self,
        model: &Self::Model,
        input: &Self::Input,
        output: &Self::Output,
        out: &mut [f64],
    );
}
