//! Sampling strategies.
//!
//! - [`UniformRandomSampler`]: minimal samples drawn uniformly without
//!   replacement (RANSAC, MSAC, LMedS).
//! - [`ProsacSampler`]: samples drawn from a progressively growing prefix of
//!   the correspondences ordered by quality (PROSAC, PROMedS).

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;
