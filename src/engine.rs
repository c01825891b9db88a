//! The robust estimation engine.
//!
//! [`RobustEstimator`] drives the sampling/consensus loop for any
//! [`Estimator`]: it draws minimal samples, fits candidate models, scores them
//! against every correspondence, adapts the iteration budget, and optionally
//! refines the winner on its inliers.
//!
//! Configuration happens through `&self` setters, so that a
//! [`RobustEstimatorListener`] receiving `&RobustEstimator` from inside
//! [`estimate`](RobustEstimator::estimate) can query the estimator. While an
//! estimation runs the estimator is locked: every setter, and `estimate`
//! itself, fails with [`RobustEstimatorError::Locked`].

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use log::{debug, trace, warn};

use crate::choices::{sampler_for, scoring_for, termination_for};
use crate::core::{Estimator, Sampler, Scoring, TerminationCriterion};
use crate::error::{RefinementError, Result, RobustEstimatorError};
use crate::optimisers::{ModelRefiner, RefinementMode};
use crate::scoring::Score;
use crate::settings::{
    check_confidence, check_iteration_bounds, check_iterations, check_progress_delta,
    check_threshold, RobustMethod, RobustSettings,
};
use crate::types::{Correspondences, Covariance, InliersData};

/// Callbacks invoked synchronously during [`RobustEstimator::estimate`].
///
/// Every callback receives the estimator, which is locked at that point:
/// getters work, setters return [`RobustEstimatorError::Locked`]. A panic in a
/// callback aborts the estimation and still unlocks the estimator.
pub trait RobustEstimatorListener<E: Estimator> {
    fn on_estimate_start(&mut self, _estimator: &RobustEstimator<'_, E>) {}

    fn on_estimate_end(&mut self, _estimator: &RobustEstimator<'_, E>) {}

    /// Called at the start of every iteration, `iteration` counting from 0.
    fn on_estimate_next_iteration(&mut self, _estimator: &RobustEstimator<'_, E>, _iteration: usize) {}

    /// Called when the progress fraction in \[0, 1\] advanced by at least the
    /// configured progress delta.
    fn on_estimate_progress_change(&mut self, _estimator: &RobustEstimator<'_, E>, _progress: f32) {}
}

type Listener<'a, E> = &'a mut dyn RobustEstimatorListener<E>;

/// Holds the lock for the duration of one estimation and hands the listener
/// back when dropped, whether the estimation returned or unwound.
struct EstimationGuard<'e, 'a, E: Estimator> {
    owner: &'e RobustEstimator<'a, E>,
    listener: Option<Listener<'a, E>>,
}

impl<'e, 'a, E: Estimator> EstimationGuard<'e, 'a, E> {
    fn lock(owner: &'e RobustEstimator<'a, E>) -> Self {
        owner.locked.set(true);
        let listener = owner.listener.borrow_mut().take();
        Self { owner, listener }
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn RobustEstimatorListener<E>, &RobustEstimator<'a, E>)) {
        if let Some(listener) = self.listener.as_deref_mut() {
            f(listener, self.owner);
        }
    }
}

impl<E: Estimator> Drop for EstimationGuard<'_, '_, E> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            *self.owner.listener.borrow_mut() = Some(listener);
        }
        self.owner.locked.set(false);
    }
}

/// Best hypothesis found so far.
struct Consensus<M> {
    model: M,
    score: Score,
    inliers: Vec<bool>,
    residuals: Vec<f64>,
}

/// Robust estimator running one of the RANSAC-family methods over borrowed
/// correspondences.
///
/// ```rust
/// use nalgebra::{Point2, Vector2};
/// use sacfit::engine::RobustEstimator;
/// use sacfit::estimators::EuclideanTransform2DEstimator;
/// use sacfit::models::EuclideanTransform2D;
/// use sacfit::settings::RobustMethod;
///
/// let truth = EuclideanTransform2D::new(0.3, Vector2::new(1.0, 2.0));
/// let inputs: Vec<_> = (0..20).map(|i| Point2::new(i as f64, (i * i % 7) as f64)).collect();
/// let outputs: Vec<_> = inputs.iter().map(|p| truth.transform_point(p)).collect();
///
/// let estimator = RobustEstimator::with_correspondences(
///     EuclideanTransform2DEstimator::new(),
///     RobustMethod::Ransac,
///     &inputs,
///     &outputs,
/// )
/// .unwrap();
/// let model = estimator.estimate().unwrap();
/// assert!((model.angle() - 0.3).abs() < 1e-9);
/// ```
pub struct RobustEstimator<'a, E: Estimator> {
    estimator: E,
    method: Cell<RobustMethod>,
    settings: RefCell<RobustSettings>,
    inputs: Cell<Option<&'a [E::Input]>>,
    outputs: RefCell<Option<Cow<'a, [E::Output]>>>,
    quality_scores: Cell<Option<&'a [f64]>>,
    listener: RefCell<Option<Listener<'a, E>>>,
    has_listener: Cell<bool>,
    refiner: RefCell<Option<Box<dyn ModelRefiner<E> + 'a>>>,
    locked: Cell<bool>,
    inliers_data: RefCell<Option<InliersData>>,
    covariance: RefCell<Option<Covariance>>,
    iterations: Cell<usize>,
}

impl<'a, E: Estimator> RobustEstimator<'a, E> {
    /// Estimator with default settings and no data.
    pub fn new(estimator: E, method: RobustMethod) -> Self {
        Self {
            estimator,
            method: Cell::new(method),
            settings: RefCell::new(RobustSettings::default()),
            inputs: Cell::new(None),
            outputs: RefCell::new(None),
            quality_scores: Cell::new(None),
            listener: RefCell::new(None),
            has_listener: Cell::new(false),
            refiner: RefCell::new(None),
            locked: Cell::new(false),
            inliers_data: RefCell::new(None),
            covariance: RefCell::new(None),
            iterations: Cell::new(0),
        }
    }

    pub fn with_settings(estimator: E, method: RobustMethod, settings: RobustSettings) -> Result<Self> {
        settings.validate()?;
        let this = Self::new(estimator, method);
        *this.settings.borrow_mut() = settings;
        Ok(this)
    }

    pub fn with_correspondences(
        estimator: E,
        method: RobustMethod,
        inputs: &'a [E::Input],
        outputs: &'a [E::Output],
    ) -> Result<Self> {
        let this = Self::new(estimator, method);
        this.set_correspondences(inputs, outputs)?;
        Ok(this)
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked.get() {
            return Err(RobustEstimatorError::Locked);
        }
        Ok(())
    }

    fn update_settings(&self, f: impl FnOnce(&mut RobustSettings)) -> Result<()> {
        self.ensure_unlocked()?;
        f(&mut self.settings.borrow_mut());
        Ok(())
    }

    // ---- getters -------------------------------------------------------

    /// The wrapped model fitter.
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn method(&self) -> RobustMethod {
        self.method.get()
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> RobustSettings {
        self.settings.borrow().clone()
    }

    pub fn threshold(&self) -> f64 {
        self.settings.borrow().threshold
    }

    pub fn confidence(&self) -> f64 {
        self.settings.borrow().confidence
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.borrow().max_iterations
    }

    pub fn min_iterations(&self) -> usize {
        self.settings.borrow().min_iterations
    }

    pub fn progress_delta(&self) -> f32 {
        self.settings.borrow().progress_delta
    }

    pub fn is_refine_result(&self) -> bool {
        self.settings.borrow().refine_result
    }

    pub fn is_keep_covariance(&self) -> bool {
        self.settings.borrow().keep_covariance
    }

    pub fn is_fast_refinement(&self) -> bool {
        self.settings.borrow().fast_refinement
    }

    pub fn is_compute_and_keep_inliers(&self) -> bool {
        self.settings.borrow().compute_and_keep_inliers
    }

    pub fn is_compute_and_keep_residuals(&self) -> bool {
        self.settings.borrow().compute_and_keep_residuals
    }

    pub fn is_use_weak_minimum_size(&self) -> bool {
        self.settings.borrow().use_weak_minimum_size
    }

    pub fn seed(&self) -> Option<u64> {
        self.settings.borrow().seed
    }

    pub fn inputs(&self) -> Option<&'a [E::Input]> {
        self.inputs.get()
    }

    /// Number of correspondences currently set.
    pub fn correspondence_count(&self) -> Option<usize> {
        self.inputs.get().map(<[E::Input]>::len)
    }

    pub fn quality_scores(&self) -> Option<&'a [f64]> {
        self.quality_scores.get()
    }

    pub fn has_listener(&self) -> bool {
        self.has_listener.get()
    }

    pub fn has_refiner(&self) -> bool {
        self.refiner.borrow().is_some()
    }

    /// Sample size in use: the weak one when the weak flag is set.
    pub fn min_sample_size(&self) -> usize {
        if self.is_use_weak_minimum_size() {
            self.estimator.weak_sample_size()
        } else {
            self.estimator.sample_size()
        }
    }

    /// Whether an estimation is in progress.
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Whether [`estimate`](Self::estimate) can run: correspondences of equal
    /// length at least the sample size, plus matching quality scores for the
    /// PROSAC-based methods.
    pub fn is_ready(&self) -> bool {
        let Some(inputs) = self.inputs.get() else {
            return false;
        };
        let outputs_len = self.outputs.borrow().as_ref().map(|o| o.len());
        if outputs_len != Some(inputs.len()) || inputs.len() < self.min_sample_size() {
            return false;
        }
        if self.method.get().requires_quality_scores() {
            return self
                .quality_scores
                .get()
                .is_some_and(|q| q.len() == inputs.len());
        }
        true
    }

    /// Inliers of the last successful estimation.
    pub fn inliers_data(&self) -> Option<InliersData> {
        self.inliers_data.borrow().clone()
    }

    /// Parameter covariance of the last successful estimation, when kept.
    pub fn covariance(&self) -> Option<Covariance> {
        self.covariance.borrow().clone()
    }

    /// Iterations run by the last successful estimation.
    pub fn iterations(&self) -> usize {
        self.iterations.get()
    }

    // ---- setters -------------------------------------------------------

    pub fn set_threshold(&self, threshold: f64) -> Result<()> {
        self.ensure_unlocked()?;
        check_threshold(threshold)?;
        self.update_settings(|s| s.threshold = threshold)
    }

    pub fn set_confidence(&self, confidence: f64) -> Result<()> {
        self.ensure_unlocked()?;
        check_confidence(confidence)?;
        self.update_settings(|s| s.confidence = confidence)
    }

    pub fn set_max_iterations(&self, max_iterations: usize) -> Result<()> {
        self.ensure_unlocked()?;
        check_iterations("max iterations", max_iterations)?;
        check_iteration_bounds(self.settings.borrow().min_iterations, max_iterations)?;
        self.update_settings(|s| s.max_iterations = max_iterations)
    }

    pub fn set_min_iterations(&self, min_iterations: usize) -> Result<()> {
        self.ensure_unlocked()?;
        check_iterations("min iterations", min_iterations)?;
        check_iteration_bounds(min_iterations, self.settings.borrow().max_iterations)?;
        self.update_settings(|s| s.min_iterations = min_iterations)
    }

    pub fn set_progress_delta(&self, progress_delta: f32) -> Result<()> {
        self.ensure_unlocked()?;
        check_progress_delta(progress_delta)?;
        self.update_settings(|s| s.progress_delta = progress_delta)
    }

    pub fn set_refine_result(&self, refine_result: bool) -> Result<()> {
        self.update_settings(|s| s.refine_result = refine_result)
    }

    pub fn set_keep_covariance(&self, keep_covariance: bool) -> Result<()> {
        self.update_settings(|s| s.keep_covariance = keep_covariance)
    }

    pub fn set_fast_refinement(&self, fast_refinement: bool) -> Result<()> {
        self.update_settings(|s| s.fast_refinement = fast_refinement)
    }

    pub fn set_compute_and_keep_inliers(&self, keep: bool) -> Result<()> {
        self.update_settings(|s| s.compute_and_keep_inliers = keep)
    }

    pub fn set_compute_and_keep_residuals(&self, keep: bool) -> Result<()> {
        self.update_settings(|s| s.compute_and_keep_residuals = keep)
    }

    /// Toggle the estimator's reduced minimal sample size. Turning it off may
    /// leave too few correspondences, which [`is_ready`](Self::is_ready)
    /// reports.
    pub fn set_use_weak_minimum_size(&self, use_weak: bool) -> Result<()> {
        self.update_settings(|s| s.use_weak_minimum_size = use_weak)
    }

    pub fn set_seed(&self, seed: Option<u64>) -> Result<()> {
        self.update_settings(|s| s.seed = seed)
    }

    pub fn set_method(&self, method: RobustMethod) -> Result<()> {
        self.ensure_unlocked()?;
        self.method.set(method);
        Ok(())
    }

    /// Replace every setting at once.
    pub fn set_settings(&self, settings: RobustSettings) -> Result<()> {
        self.ensure_unlocked()?;
        settings.validate()?;
        *self.settings.borrow_mut() = settings;
        Ok(())
    }

    /// Set the correspondences. Both slices are borrowed, never copied.
    pub fn set_correspondences(&self, inputs: &'a [E::Input], outputs: &'a [E::Output]) -> Result<()> {
        self.ensure_unlocked()?;
        if inputs.len() != outputs.len() {
            return Err(RobustEstimatorError::invalid(format!(
                "{} inputs but {} outputs",
                inputs.len(),
                outputs.len()
            )));
        }
        self.check_len("correspondences", inputs.len())?;
        self.inputs.set(Some(inputs));
        *self.outputs.borrow_mut() = Some(Cow::Borrowed(outputs));
        Ok(())
    }

    /// Set one quality score per correspondence; higher means more likely to
    /// be an inlier.
    pub fn set_quality_scores(&self, quality_scores: &'a [f64]) -> Result<()> {
        self.ensure_unlocked()?;
        self.check_len("quality scores", quality_scores.len())?;
        if let Some(n) = self.correspondence_count() {
            if n != quality_scores.len() {
                return Err(RobustEstimatorError::invalid(format!(
                    "{} quality scores for {n} correspondences",
                    quality_scores.len()
                )));
            }
        }
        self.quality_scores.set(Some(quality_scores));
        Ok(())
    }

    pub fn set_listener(&self, listener: &'a mut dyn RobustEstimatorListener<E>) -> Result<()> {
        self.ensure_unlocked()?;
        *self.listener.borrow_mut() = Some(listener);
        self.has_listener.set(true);
        Ok(())
    }

    pub fn clear_listener(&self) -> Result<()> {
        self.ensure_unlocked()?;
        *self.listener.borrow_mut() = None;
        self.has_listener.set(false);
        Ok(())
    }

    /// Refiner applied to the best model when refinement is enabled.
    pub fn set_refiner(&self, refiner: Box<dyn ModelRefiner<E> + 'a>) -> Result<()> {
        self.ensure_unlocked()?;
        *self.refiner.borrow_mut() = Some(refiner);
        Ok(())
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        let min = self.min_sample_size();
        if len < min {
            return Err(RobustEstimatorError::invalid(format!(
                "{len} {what}, need at least {min}"
            )));
        }
        Ok(())
    }

    // ---- estimation ----------------------------------------------------

    /// Run the configured robust method and return the best model.
    ///
    /// On success the inliers data (and covariance, when kept) are replaced.
    /// On failure they are left as they were.
    pub fn estimate(&self) -> Result<E::Model> {
        self.ensure_unlocked()?;
        if !self.is_ready() {
            return Err(RobustEstimatorError::NotReady);
        }

        let mut guard = EstimationGuard::lock(self);
        guard.notify(|l, est| l.on_estimate_start(est));

        let settings = self.settings();
        let method = self.method.get();
        let inputs = self.inputs.get().ok_or(RobustEstimatorError::NotReady)?;
        let outputs = self
            .outputs
            .borrow()
            .clone()
            .ok_or(RobustEstimatorError::NotReady)?;
        let data = Correspondences::new(inputs, &*outputs).ok_or(RobustEstimatorError::NotReady)?;

        let point_count = data.len();
        let sample_size = self.min_sample_size();
        let quality_scores = self
            .quality_scores
            .get()
            .filter(|_| method.requires_quality_scores());
        let mut sampler = sampler_for(method, &settings, quality_scores);
        let scoring = scoring_for(method, &settings);
        let mut termination = termination_for(method, &settings);

        let max_iterations = settings.max_iterations;
        let min_iterations = settings.min_iterations.min(max_iterations);
        debug!(
            "{method:?}: {point_count} correspondences, sample size {sample_size}, threshold {}, at most {max_iterations} iterations",
            settings.threshold
        );

        let mut required = max_iterations;
        let mut sample = vec![0usize; sample_size];
        let mut residuals = vec![0.0; point_count];
        let mut inliers = Vec::with_capacity(point_count);
        let mut best: Option<Consensus<E::Model>> = None;
        let mut last_progress = 0.0_f32;
        let mut iteration = 0usize;

        sampler.reset();
        while iteration < required {
            guard.notify(|l, est| l.on_estimate_next_iteration(est, iteration));

            if sampler.sample(point_count, sample_size, &mut sample)
                && self.estimator.is_valid_sample(data, &sample)
            {
                for model in self.estimator.estimate_model(data, &sample) {
                    if !self
                        .estimator
                        .is_valid_model(&model, data, &sample, scoring.threshold())
                    {
                        continue;
                    }
                    for (r, (input, output)) in residuals.iter_mut().zip(data.iter()) {
                        *r = self.estimator.residual(&model, input, output);
                    }
                    let score = scoring.score(&residuals, sample_size, &mut inliers);
                    if best.as_ref().is_some_and(|b| score <= b.score) {
                        continue;
                    }

                    trace!(
                        "iteration {iteration}: new best with {} inliers ({:?})",
                        score.inlier_count,
                        score
                    );
                    let stop = termination.check(
                        point_count,
                        &score,
                        sample_size,
                        max_iterations,
                        &mut required,
                    );
                    if stop {
                        required = required.min(min_iterations.max(iteration + 1));
                    }
                    best = Some(Consensus {
                        model,
                        score,
                        inliers: inliers.clone(),
                        residuals: residuals.clone(),
                    });
                }
            }

            iteration += 1;
            let progress = (iteration as f32 / required.max(1) as f32).min(1.0);
            if progress > last_progress && progress - last_progress >= settings.progress_delta {
                last_progress = progress;
                guard.notify(|l, est| l.on_estimate_progress_change(est, progress));
            }
        }

        let best = match best {
            Some(b) if b.score.inlier_count >= sample_size => b,
            Some(b) => {
                return Err(RobustEstimatorError::RobustEstimation(format!(
                    "best model has {} inliers after {iteration} iterations, need at least {sample_size}",
                    b.score.inlier_count
                )));
            }
            None => {
                return Err(RobustEstimatorError::RobustEstimation(format!(
                    "no valid model found in {iteration} iterations"
                )));
            }
        };

        let mut model = best.model;
        let mut covariance = None;
        if settings.refine_result {
            let inlier_indices: Vec<usize> = best
                .inliers
                .iter()
                .enumerate()
                .filter_map(|(i, &is_inlier)| is_inlier.then_some(i))
                .collect();
            let outcome = match self.refiner.borrow().as_deref() {
                Some(refiner) => refiner.refine(
                    &self.estimator,
                    data,
                    &inlier_indices,
                    &model,
                    RefinementMode::from_fast_flag(settings.fast_refinement),
                    settings.keep_covariance,
                ),
                None => Err(RefinementError::Unsupported),
            };
            match outcome {
                Ok(refined) => {
                    model = refined.model;
                    covariance = refined.covariance.filter(|_| settings.keep_covariance);
                }
                Err(RefinementError::Unsupported) => {
                    debug!("no refiner configured, keeping the consensus model");
                }
                Err(err) => {
                    warn!("refinement failed, keeping the consensus model: {err}");
                }
            }
        }

        let num_inliers = best.score.inlier_count;
        debug!("{method:?}: {num_inliers}/{point_count} inliers after {iteration} iterations");
        *self.inliers_data.borrow_mut() = Some(InliersData::new(
            settings.compute_and_keep_inliers.then_some(best.inliers),
            settings.compute_and_keep_residuals.then_some(best.residuals),
            num_inliers,
        ));
        *self.covariance.borrow_mut() = covariance;
        self.iterations.set(iteration);

        guard.notify(|l, est| l.on_estimate_end(est));
        Ok(model)
    }
}

impl<'a, E: Estimator<Output = ()>> RobustEstimator<'a, E> {
    /// Single-sequence constructor (e.g. points on a quadric).
    pub fn with_entities(estimator: E, method: RobustMethod, entities: &'a [E::Input]) -> Result<Self> {
        let this = Self::new(estimator, method);
        this.set_entities(entities)?;
        Ok(this)
    }

    /// Set the entities of a single-sequence problem.
    pub fn set_entities(&self, entities: &'a [E::Input]) -> Result<()> {
        self.ensure_unlocked()?;
        self.check_len("entities", entities.len())?;
        self.inputs.set(Some(entities));
        *self.outputs.borrow_mut() = Some(Cow::Owned(vec![(); entities.len()]));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimisers::LeastSquaresRefiner;
    use crate::settings::{DEFAULT_MAX_ITERATIONS, DEFAULT_MIN_ITERATIONS};

    /// Fits a constant to scalars: one-point samples, mean refit.
    struct ConstantEstimator;

    impl Estimator for ConstantEstimator {
        type Input = f64;
        type Output = ();
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn non_minimal_sample_size(&self) -> usize {
            1
        }

        fn is_valid_sample(&self, _data: Correspondences<'_, f64, ()>, sample: &[usize]) -> bool {
            !sample.is_empty()
        }

        fn estimate_model(&self, data: Correspondences<'_, f64, ()>, sample: &[usize]) -> Vec<f64> {
            let sum: f64 = sample.iter().map(|&i| data.input(i)).sum();
            vec![sum / sample.len() as f64]
        }

        fn residual(&self, model: &f64, input: &f64, _output: &()) -> f64 {
            (model - input).abs()
        }
    }

    fn values() -> Vec<f64> {
        let mut v: Vec<f64> = (0..40).map(|i| 5.0 + 0.01 * ((i % 5) as f64 - 2.0)).collect();
        v.extend([100.0, -50.0, 42.0, 17.0, 1e3]);
        v
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        locked_seen: bool,
    }

    impl RobustEstimatorListener<ConstantEstimator> for Recorder {
        fn on_estimate_start(&mut self, est: &RobustEstimator<'_, ConstantEstimator>) {
            self.locked_seen = est.is_locked();
            self.events.push("start".into());
        }

        fn on_estimate_end(&mut self, est: &RobustEstimator<'_, ConstantEstimator>) {
            self.locked_seen &= est.is_locked();
            self.events.push("end".into());
        }

        fn on_estimate_next_iteration(&mut self, _est: &RobustEstimator<'_, ConstantEstimator>, iteration: usize) {
            self.events.push(format!("next:{iteration}"));
        }

        fn on_estimate_progress_change(&mut self, _est: &RobustEstimator<'_, ConstantEstimator>, progress: f32) {
            self.events.push(format!("progress:{progress}"));
        }
    }

    #[test]
    fn every_method_finds_the_constant() {
        let data = values();
        let quality: Vec<f64> = data.iter().map(|v| 1.0 / (1.0 + (v - 5.0).abs())).collect();
        for method in RobustMethod::ALL {
            let est = RobustEstimator::with_entities(ConstantEstimator, method, &data).unwrap();
            est.set_quality_scores(&quality).unwrap();
            est.set_threshold(0.05).unwrap();
            est.set_seed(Some(9)).unwrap();
            est.set_refiner(Box::new(LeastSquaresRefiner::new())).unwrap();
            let model = est.estimate().unwrap();
            assert!((model - 5.0).abs() < 0.05, "{method:?} -> {model}");
            let inliers = est.inliers_data().unwrap();
            assert_eq!(inliers.num_inliers(), 40, "{method:?}");
            assert_eq!(inliers.inliers().unwrap().len(), data.len());
            assert!(!est.is_locked());
        }
    }

    #[test]
    fn listener_sees_ordered_events_while_locked() {
        let data = values();
        let mut recorder = Recorder::default();
        {
            let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Ransac, &data).unwrap();
            est.set_threshold(0.05).unwrap();
            est.set_seed(Some(1)).unwrap();
            est.set_progress_delta(0.0).unwrap();
            est.set_listener(&mut recorder).unwrap();
            assert!(est.has_listener());
            est.estimate().unwrap();
            assert!(est.iterations() >= 1);
        }

        assert!(recorder.locked_seen);
        let events = &recorder.events;
        assert_eq!(events.first().map(String::as_str), Some("start"));
        assert_eq!(events.last().map(String::as_str), Some("end"));
        let iterations: Vec<usize> = events
            .iter()
            .filter_map(|e| e.strip_prefix("next:"))
            .map(|s| s.parse().unwrap())
            .collect();
        assert!(!iterations.is_empty());
        assert!(iterations.iter().enumerate().all(|(i, &it)| i == it));
        assert!(events.iter().any(|e| e.starts_with("progress:")));
    }

    struct Panicking;

    impl RobustEstimatorListener<ConstantEstimator> for Panicking {
        fn on_estimate_next_iteration(&mut self, _est: &RobustEstimator<'_, ConstantEstimator>, _iteration: usize) {
            panic!("abort estimation");
        }
    }

    #[test]
    fn panicking_listener_releases_the_lock() {
        let data = values();
        let mut listener = Panicking;
        let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Msac, &data).unwrap();
        est.set_listener(&mut listener).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| est.estimate()));
        assert!(result.is_err());
        assert!(!est.is_locked());
        assert!(est.inliers_data().is_none());
        assert!(est.clear_listener().is_ok());
        assert!(!est.has_listener());
        assert!(est.estimate().is_ok());
    }

    #[test]
    fn failed_estimation_keeps_previous_results() {
        let data = values();
        // Degenerate data: every value is NaN, so no model ever scores.
        let nan = vec![f64::NAN; 10];
        let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Ransac, &data).unwrap();
        est.set_threshold(0.05).unwrap();
        est.estimate().unwrap();
        let before = est.inliers_data();
        assert!(before.is_some());

        est.set_entities(&nan).unwrap();
        est.set_max_iterations(5).unwrap();
        let err = est.estimate().unwrap_err();
        assert!(matches!(err, RobustEstimatorError::RobustEstimation(_)));
        assert_eq!(est.inliers_data(), before);
        assert!(!est.is_locked());
    }

    #[test]
    fn keep_flags_control_inliers_data() {
        let data = values();
        let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Lmeds, &data).unwrap();
        est.set_threshold(1e-3).unwrap();
        est.set_compute_and_keep_inliers(false).unwrap();
        est.set_compute_and_keep_residuals(false).unwrap();
        est.estimate().unwrap();
        let inliers = est.inliers_data().unwrap();
        assert!(inliers.inliers().is_none());
        assert!(inliers.residuals().is_none());
        assert!(inliers.num_inliers() >= 1);
    }

    #[test]
    fn median_stop_threshold_ends_early() {
        let data = vec![3.0; 30];
        let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Lmeds, &data).unwrap();
        est.set_threshold(1e-6).unwrap();
        est.set_max_iterations(1000).unwrap();
        est.estimate().unwrap();
        assert_eq!(est.iterations(), 1);
    }

    #[test]
    fn iteration_setters_reject_crossed_bounds() {
        let data = values();
        let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Ransac, &data).unwrap();
        est.set_min_iterations(10).unwrap();
        let err = est.set_max_iterations(5).unwrap_err();
        assert!(matches!(err, RobustEstimatorError::InvalidArgument(_)));
        assert_eq!(est.max_iterations(), DEFAULT_MAX_ITERATIONS);

        est.set_max_iterations(10).unwrap();
        assert!(est.set_min_iterations(11).is_err());
        assert_eq!(est.min_iterations(), 10);

        // Whatever the setters accept must survive a settings round trip.
        let settings = est.settings();
        assert!(settings.validate().is_ok());
        est.set_settings(settings.clone()).unwrap();
        let json = settings.to_json_string();
        assert_eq!(RobustSettings::from_json_str(&json).unwrap(), settings);
    }

    #[test]
    fn msac_budget_follows_the_final_best_model() {
        // Models at 0.99 take every cluster as inliers but lose on loss to the
        // tighter model at 0.0, which has far fewer inliers.
        let mut data = vec![0.0; 50];
        data.extend(std::iter::repeat(0.99).take(30));
        data.extend(std::iter::repeat(1.98).take(40));
        data.extend(std::iter::repeat(100.0).take(10));
        let n = data.len() as f64;

        for seed in 0..20 {
            let est = RobustEstimator::with_entities(ConstantEstimator, RobustMethod::Msac, &data).unwrap();
            est.set_threshold(1.0).unwrap();
            est.set_refine_result(false).unwrap();
            est.set_seed(Some(seed)).unwrap();
            est.estimate().unwrap();

            let inliers = est.inliers_data().unwrap().num_inliers();
            let required = crate::core::required_iterations(0.99, inliers as f64 / n, 1)
                .unwrap()
                .clamp(DEFAULT_MIN_ITERATIONS, DEFAULT_MAX_ITERATIONS);
            assert!(
                est.iterations() >= required,
                "seed {seed}: {} iterations, {required} required for {inliers} inliers",
                est.iterations()
            );
        }
    }
}
