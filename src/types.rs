//! Core shared types.
//!
//! Correspondences are kept as two parallel slices borrowed from the caller so
//! that the estimators never copy the input data. Single-sequence problems
//! (e.g. fitting a quadric to points) use `()` as the output type.

use nalgebra::DMatrix;

/// Parameter covariance of a refined model (`p x p`, `p` = parameter count).
pub type Covariance = DMatrix<f64>;

/// Read-only view over a correspondence set.
#[derive(Debug)]
pub struct Correspondences<'d, I, O> {
    inputs: &'d [I],
    outputs: &'d [O],
}

impl<I, O> Clone for Correspondences<'_, I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for Correspondences<'_, I, O> {}

impl<'d, I, O> Correspondences<'d, I, O> {
    /// Build a view over two slices. Returns `None` when the lengths differ.
    pub fn new(inputs: &'d [I], outputs: &'d [O]) -> Option<Self> {
        (inputs.len() == outputs.len()).then_some(Self { inputs, outputs })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn inputs(&self) -> &'d [I] {
        self.inputs
    }

    pub fn outputs(&self) -> &'d [O] {
        self.outputs
    }

    pub fn input(&self, index: usize) -> &'d I {
        &self.inputs[index]
    }

    pub fn output(&self, index: usize) -> &'d O {
        &self.outputs[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'d I, &'d O)> + 'd {
        self.inputs.iter().zip(self.outputs.iter())
    }

    /// Gather the correspondences addressed by `sample`.
    pub fn gather(&self, sample: &[usize]) -> (Vec<&'d I>, Vec<&'d O>) {
        sample
            .iter()
            .map(|&idx| (&self.inputs[idx], &self.outputs[idx]))
            .unzip()
    }
}

/// Inlier/outlier partition of the best model found by an estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct InliersData {
    inliers: Option<Vec<bool>>,
    residuals: Option<Vec<f64>>,
    num_inliers: usize,
}

impl InliersData {
    pub fn new(inliers: Option<Vec<bool>>, residuals: Option<Vec<f64>>, num_inliers: usize) -> Self {
        Self {
            inliers,
            residuals,
            num_inliers,
        }
    }

    /// Membership flag per correspondence, when kept.
    pub fn inliers(&self) -> Option<&[bool]> {
        self.inliers.as_deref()
    }

    /// Residual per correspondence under the best model, when kept.
    pub fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    pub fn num_inliers(&self) -> usize {
        self.num_inliers
    }

    /// Indices of the inlier correspondences, when membership was kept.
    pub fn inlier_indices(&self) -> Option<Vec<usize>> {
        self.inliers.as_ref().map(|flags| {
            flags
                .iter()
                .enumerate()
                .filter_map(|(i, &is_inlier)| is_inlier.then_some(i))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correspondences_reject_mismatched_lengths() {
        let a = [1.0, 2.0, 3.0];
        let b = [1.0, 2.0];
        assert!(Correspondences::new(&a, &b).is_none());
        let view = Correspondences::new(&a, &a).unwrap();
        assert_eq!(view.len(), 3);
        let (ins, outs) = view.gather(&[2, 0]);
        assert_eq!(ins, vec![&3.0, &1.0]);
        assert_eq!(outs, vec![&3.0, &1.0]);
    }

    #[test]
    fn inlier_indices_follow_flags() {
        let data = InliersData::new(Some(vec![true, false, true]), None, 2);
        assert_eq!(data.inlier_indices(), Some(vec![0, 2]));
        assert!(data.residuals().is_none());
        assert_eq!(data.num_inliers(), 2);
    }
}
