//! Static load control: the load factor λ advances by Δλ each step and is
//! applied to the domain as the pseudo-time of its load patterns.

use super::{IntegratorState, Integrator, StageTracker};
use crate::error::{SolverError, SolverResult};
use crate::model::{AnalysisModel, TangentFactors};
use crate::system::LinearSoe;
use log::debug;
use nalgebra::DVector;
use nlfe_domain::Domain;

#[derive(Debug, Clone)]
pub struct LoadControl {
    delta_lambda: f64,
    min_delta: f64,
    max_delta: f64,
    /// Desired iterations per step for the adaptive increment
    desired_iterations: Option<usize>,
    last_iterations: usize,
    lambda: f64,
    committed_lambda: f64,
    tracker: StageTracker,
}

impl LoadControl {
    pub fn new(delta_lambda: f64) -> Self {
        Self {
            delta_lambda,
            min_delta: delta_lambda,
            max_delta: delta_lambda,
            desired_iterations: None,
            last_iterations: 0,
            lambda: 0.0,
            committed_lambda: 0.0,
            tracker: StageTracker::new(),
        }
    }

    /// Scale Δλ by `desired / last iterations` after every step, clamped to
    /// `[min_delta, max_delta]`
    pub fn adaptive(
        delta_lambda: f64,
        desired_iterations: usize,
        min_delta: f64,
        max_delta: f64,
    ) -> SolverResult<Self> {
        if desired_iterations == 0 || min_delta > max_delta {
            return Err(SolverError::InvalidInput(format!(
                "adaptive load control needs desired iterations > 0 and min ≤ max \
                 (got {desired_iterations}, [{min_delta}, {max_delta}])"
            )));
        }
        Ok(Self {
            min_delta,
            max_delta,
            desired_iterations: Some(desired_iterations),
            ..Self::new(delta_lambda)
        })
    }

    pub fn load_factor(&self) -> f64 {
        self.lambda
    }

    pub fn delta_lambda(&self) -> f64 {
        self.delta_lambda
    }

    fn adapt_increment(&mut self) {
        let Some(desired) = self.desired_iterations else {
            return;
        };
        if self.last_iterations == 0 {
            return;
        }
        let factor = desired as f64 / self.last_iterations as f64;
        let next = self.delta_lambda * factor;
        self.delta_lambda = if self.delta_lambda >= 0.0 {
            next.clamp(self.min_delta, self.max_delta)
        } else {
            next.clamp(-self.max_delta.abs(), -self.min_delta.abs())
        };
        debug!(
            "load control: {} iterations last step, Δλ = {:.4e}",
            self.last_iterations, self.delta_lambda
        );
    }
}

impl Integrator for LoadControl {
    fn name(&self) -> &'static str {
        "LoadControl"
    }

    fn tracker(&self) -> &StageTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StageTracker {
        &mut self.tracker
    }

    fn domain_changed(
        &mut self,
        _model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.lambda = domain.current_time();
        self.committed_lambda = domain.committed_time();
        self.tracker.set(IntegratorState::Initialized);
        Ok(())
    }

    fn new_step(
        &mut self,
        _delta: f64,
        _model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require(
            "new_step",
            &[IntegratorState::Initialized, IntegratorState::Committed],
        )?;
        self.adapt_increment();
        self.lambda = self.committed_lambda + self.delta_lambda;
        domain.apply_load(self.lambda)?;
        self.tracker.set(IntegratorState::StepStarted);
        Ok(())
    }

    fn update(
        &mut self,
        dx: &DVector<f64>,
        model: &mut AnalysisModel,
        domain: &mut Domain,
        _soe: &mut dyn LinearSoe,
    ) -> SolverResult<()> {
        self.tracker.require_step("update")?;
        model.incr_disp(domain, dx)?;
        model.update_domain(domain)?;
        self.tracker.set(IntegratorState::IterationReady);
        Ok(())
    }

    fn commit(&mut self, model: &mut AnalysisModel, domain: &mut Domain) -> SolverResult<()> {
        self.tracker.require("commit", &[IntegratorState::IterationReady])?;
        model.commit(domain);
        self.committed_lambda = self.lambda;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn revert_to_last_step(
        &mut self,
        model: &mut AnalysisModel,
        domain: &mut Domain,
    ) -> SolverResult<()> {
        self.tracker.require_initialized("revert_to_last_step")?;
        self.lambda = self.committed_lambda;
        self.last_iterations = 0;
        model.revert(domain)?;
        domain.apply_load(self.lambda)?;
        self.tracker.set(IntegratorState::Committed);
        Ok(())
    }

    fn factors(&self) -> TangentFactors {
        TangentFactors::stiffness_only()
    }

    fn record_iterations(&mut self, iterations: usize) {
        self.last_iterations = iterations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn adaptive_increment_follows_iteration_ratio() {
        let mut lc = LoadControl::adaptive(0.1, 4, 0.01, 0.2).unwrap();
        lc.record_iterations(8);
        lc.adapt_increment();
        assert_relative_eq!(lc.delta_lambda(), 0.05);

        lc.record_iterations(1);
        lc.adapt_increment();
        assert_relative_eq!(lc.delta_lambda(), 0.2);
    }

    #[test]
    fn fixed_increment_is_unchanged() {
        let mut lc = LoadControl::new(0.25);
        lc.record_iterations(10);
        lc.adapt_increment();
        assert_relative_eq!(lc.delta_lambda(), 0.25);
    }

    #[test]
    fn invalid_adaptive_bounds_rejected() {
        assert!(LoadControl::adaptive(0.1, 0, 0.01, 0.2).is_err());
        assert!(LoadControl::adaptive(0.1, 3, 0.5, 0.2).is_err());
    }

    #[test]
    fn new_step_before_domain_changed_fails() {
        let mut lc = LoadControl::new(1.0);
        let mut model = AnalysisModel::new();
        let mut domain = Domain::new();
        let mut soe = crate::system::FullGenSoe::new();
        assert!(matches!(
            lc.new_step(0.0, &mut model, &mut domain, &mut soe),
            Err(SolverError::SchemeNotInitialized { stage: "new_step", .. })
        ));
    }
}
