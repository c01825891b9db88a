//! Error types returned by the robust estimators.

use thiserror::Error;

/// Errors raised by [`RobustEstimator`](crate::engine::RobustEstimator) and its
/// configuration surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RobustEstimatorError {
    /// A setter or constructor received an out-of-range value or mismatched
    /// correspondence sizes. The estimator is left untouched.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A mutator or `estimate()` was called while an estimation is running.
    #[error("estimator is locked while an estimation is in progress")]
    Locked,
    /// `estimate()` was called before correspondences (and quality scores, when
    /// required) were provided.
    #[error("estimator is not ready: correspondences or quality scores are missing or too few")]
    NotReady,
    /// No candidate model reached minimal consensus within the iteration budget.
    #[error("robust estimation failed: {0}")]
    RobustEstimation(String),
}

impl RobustEstimatorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Non-fatal refinement failures. The engine falls back to the unrefined model.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RefinementError {
    #[error("estimator does not support refinement")]
    Unsupported,
    #[error("need at least {required} inliers to refine, got {actual}")]
    NotEnoughInliers { required: usize, actual: usize },
    #[error("non-linear refinement did not converge")]
    NotConverged,
    #[error("normal matrix is singular, covariance unavailable")]
    Singular,
    #[error("refined parameters do not describe a valid model")]
    InvalidModel,
}

pub type Result<T, E = RobustEstimatorError> = std::result::Result<T, E>;
